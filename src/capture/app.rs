use anyhow::{anyhow, Context, Result};
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::style::Print;
use crossterm::terminal::{self, ClearType};
use crossterm::{cursor, execute, queue};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{
    Dispatcher, HoldRepeater, KeyBinding, KeyframeLog, ACTION_COUNT, ACTION_EXIT,
    ACTION_GENERATE, ACTION_NEW_CLIP, ACTION_QUIT, ACTION_SAVE,
};
use crate::clips::ClipSet;
use crate::config::{RenderOverrides, Settings};
use crate::counter::CounterFormatter;
use crate::render::{BatchRenderer, CancelFlag};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const RECENT_SHOWN: usize = 4;

/// Messages consumed by the capture loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Key(KeyEvent),
    /// One tick of a held key's repeat timer
    Repeat(&'static str),
    InputClosed,
}

/// Everything the action handlers work on.
pub struct CaptureState {
    log: KeyframeLog,
    settings: Settings,
    overrides: RenderOverrides,
    formatter: CounterFormatter,
    save_path: PathBuf,
    cancel: CancelFlag,
    saved: bool,
    exit_warned: bool,
    stopped: bool,
    status: String,
}

impl CaptureState {
    pub fn new(settings: Settings, overrides: RenderOverrides, save_path: PathBuf) -> Self {
        let output = overrides.apply(&settings.output);
        let formatter = CounterFormatter::new(output.prepend, output.start_at);
        Self {
            log: KeyframeLog::new(Instant::now()),
            settings,
            overrides,
            formatter,
            save_path,
            cancel: CancelFlag::new(),
            saved: true,
            exit_warned: false,
            stopped: false,
            status: "Ready".to_string(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn log(&self) -> &KeyframeLog {
        &self.log
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn has_unsaved_keyframes(&self) -> bool {
        !self.saved && self.log.keyframe_count() > 0
    }

    pub fn count(&mut self, now: Instant) {
        let t = self.log.record_keyframe(now);
        self.saved = false;
        self.exit_warned = false;
        self.status = format!("Keyframe at {:.3}s", t);
    }

    pub fn new_clip(&mut self, now: Instant) {
        self.log.start_new_clip(now);
        self.status = format!("Recording clip {}", self.log.clip_index());
    }

    pub fn save(&mut self) -> Result<()> {
        let clips = self.log.clip_set();
        clips.save(&self.save_path)?;
        self.saved = true;
        self.status = format!(
            "Saved {} keyframes to {}",
            clips.keyframe_count(),
            self.save_path.display()
        );
        tracing::info!(path = %self.save_path.display(), keyframes = clips.keyframe_count(), "Saved clips");
        Ok(())
    }

    /// Render every recorded clip with the current settings.
    pub fn generate(&mut self) -> Result<()> {
        if self.log.keyframe_count() == 0 {
            self.status = "No keyframes to render".to_string();
            return Ok(());
        }

        let config = self.settings.render_config(&self.overrides)?;
        self.status = "Rendering...".to_string();
        let renderer = BatchRenderer::new(config)?.with_cancel(self.cancel.clone());
        let report = renderer.render_all(self.log.clip_set().clips())?;

        self.status = format!(
            "Rendered {} clip(s), {} failed",
            report.rendered.len(),
            report.failed.len()
        );
        Ok(())
    }

    /// Stop, unless there are unsaved keyframes and this is the first attempt.
    pub fn exit(&mut self) {
        if self.has_unsaved_keyframes() && !self.exit_warned {
            self.exit_warned = true;
            self.status = "Unsaved keyframes! Press again to exit without saving".to_string();
        } else {
            self.stopped = true;
        }
    }

    pub fn quit(&mut self) {
        self.stopped = true;
    }

    pub fn status_line(&self) -> String {
        let recent: Vec<String> = self
            .log
            .recent(RECENT_SHOWN)
            .iter()
            .map(|t| format!("{:.2}", t))
            .collect();
        format!(
            "clip {} | {} | keyframes {} | recent [{}] | {}",
            self.log.clip_index(),
            self.log.counter_label(&self.formatter),
            self.log.current().len(),
            recent.join(", "),
            self.status
        )
    }
}

fn action_table() -> Dispatcher<CaptureState> {
    Dispatcher::new(|state: &mut CaptureState, name: &str| {
        tracing::warn!(action = name, "No handler for action");
        state.status = format!("Unknown action '{}'", name);
        Ok(())
    })
    .register(ACTION_COUNT, |s: &mut CaptureState| {
        s.count(Instant::now());
        Ok(())
    })
    .register(ACTION_NEW_CLIP, |s: &mut CaptureState| {
        s.new_clip(Instant::now());
        Ok(())
    })
    .register(ACTION_SAVE, CaptureState::save)
    .register(ACTION_GENERATE, CaptureState::generate)
    .register(ACTION_EXIT, |s: &mut CaptureState| {
        s.exit();
        Ok(())
    })
    .register(ACTION_QUIT, |s: &mut CaptureState| {
        s.quit();
        Ok(())
    })
}

/// Terminal front end of a capture session.
pub struct CaptureApp {
    state: CaptureState,
    bindings: Vec<(KeyBinding, &'static str)>,
    actions: Dispatcher<CaptureState>,
}

impl CaptureApp {
    pub fn new(state: CaptureState) -> Result<Self> {
        let keybinds = &state.settings.keybinds;
        let count: KeyBinding = keybinds
            .count
            .parse()
            .map_err(|e| anyhow!("Invalid count keybind: {}", e))?;
        let new_clip: KeyBinding = keybinds
            .new_clip
            .parse()
            .map_err(|e| anyhow!("Invalid new-clip keybind: {}", e))?;

        let bindings = vec![
            (count, ACTION_COUNT),
            (new_clip, ACTION_NEW_CLIP),
            (KeyBinding::new(KeyCode::Char('s')), ACTION_SAVE),
            (KeyBinding::new(KeyCode::Char('g')), ACTION_GENERATE),
            (KeyBinding::new(KeyCode::Char('q')), ACTION_EXIT),
            (KeyBinding::new(KeyCode::Esc), ACTION_EXIT),
            (
                KeyBinding {
                    code: KeyCode::Char('c'),
                    modifiers: KeyModifiers::CONTROL,
                },
                ACTION_QUIT,
            ),
        ];

        Ok(Self {
            state,
            bindings,
            actions: action_table(),
        })
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    /// First binding wins, so configured keys shadow the fixed ones.
    pub fn action_for(&self, key: &KeyEvent) -> Option<&'static str> {
        self.bindings
            .iter()
            .find(|(binding, _)| binding.matches(key))
            .map(|(_, action)| *action)
    }

    /// Run an action. Handler failures end up in the status line, not the loop.
    pub fn perform(&mut self, action: &str) {
        if let Err(e) = self.actions.dispatch(&mut self.state, action) {
            tracing::error!(action, error = %e, "Action failed");
            self.state.status = format!("{} failed: {:#}", action, e);
        }
    }

    /// Handle one event; `hold` is present when key release events are reported.
    fn handle_event(
        &mut self,
        event: CaptureEvent,
        hold: Option<&mut HoldRepeater<&'static str, CaptureEvent>>,
    ) {
        match event {
            CaptureEvent::Key(key) => {
                let Some(action) = self.action_for(&key) else {
                    return;
                };
                let repeatable = matches!(action, ACTION_COUNT | ACTION_NEW_CLIP);
                match (key.kind, hold) {
                    (KeyEventKind::Press, Some(hold)) if repeatable => {
                        self.perform(action);
                        hold.press(action);
                    }
                    (KeyEventKind::Release, Some(hold)) => hold.release(&action),
                    // Timers repeat the action while enhanced reporting is on.
                    (KeyEventKind::Repeat, Some(_)) => {}
                    (KeyEventKind::Release, None) => {}
                    _ => self.perform(action),
                }
            }
            CaptureEvent::Repeat(action) => self.perform(action),
            CaptureEvent::InputClosed => {
                tracing::warn!("Terminal input closed");
                self.state.stopped = true;
            }
        }
    }

    /// Run the key loop until the user exits. Returns the recorded clips.
    pub fn run(mut self) -> Result<ClipSet> {
        if !crossterm::tty::IsTty::is_tty(&io::stdin()) {
            return Err(anyhow!("Capture needs an interactive terminal"));
        }

        let mut stdout = io::stdout();
        writeln!(stdout, "{}", self.help_line())?;

        let guard = RawModeGuard::enable()?;
        let (tx, rx) = channel();
        let stop = Arc::new(AtomicBool::new(false));
        let reader = spawn_reader(tx.clone(), Arc::clone(&stop));
        let mut hold = guard.enhanced.then(|| {
            HoldRepeater::new(
                self.state.settings.counter.hold_interval(),
                self.state.settings.counter.hold_multiplier.max(1),
                tx,
                CaptureEvent::Repeat as fn(&'static str) -> CaptureEvent,
            )
        });
        tracing::debug!(enhanced = guard.enhanced, "Capture loop started");

        let result = (|| -> Result<()> {
            draw_status(&mut stdout, &self.state)?;
            while !self.state.stopped {
                if self.state.cancel.is_cancelled() {
                    break;
                }
                match rx.recv_timeout(POLL_INTERVAL) {
                    Ok(event) => {
                        self.handle_event(event, hold.as_mut());
                        draw_status(&mut stdout, &self.state)?;
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            Ok(())
        })();

        stop.store(true, Ordering::Relaxed);
        if let Some(hold) = hold.as_mut() {
            hold.release_all();
        }
        let _ = reader.join();
        drop(guard);
        writeln!(stdout)?;

        result?;
        Ok(self.state.log.clip_set())
    }

    fn help_line(&self) -> String {
        let keys = &self.bindings;
        format!(
            "[{}] keyframe  [{}] new clip  [s] save  [g] generate  [q] exit",
            keys[0].0, keys[1].0
        )
    }
}

fn draw_status(out: &mut impl Write, state: &CaptureState) -> io::Result<()> {
    queue!(
        out,
        cursor::MoveToColumn(0),
        terminal::Clear(ClearType::CurrentLine),
        Print(state.status_line())
    )?;
    out.flush()
}

fn spawn_reader(tx: Sender<CaptureEvent>, stop: Arc<AtomicBool>) -> JoinHandle<()> {
    thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            match event::poll(POLL_INTERVAL) {
                Ok(false) => {}
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) => {
                        if tx.send(CaptureEvent::Key(key)).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(_) => {
                        let _ = tx.send(CaptureEvent::InputClosed);
                        break;
                    }
                },
                Err(_) => {
                    let _ = tx.send(CaptureEvent::InputClosed);
                    break;
                }
            }
        }
    })
}

/// Raw mode for the lifetime of the guard, with key release reporting when the
/// terminal supports it.
struct RawModeGuard {
    enhanced: bool,
}

impl RawModeGuard {
    fn enable() -> Result<Self> {
        terminal::enable_raw_mode().context("Failed to enable raw mode")?;
        let enhanced = matches!(terminal::supports_keyboard_enhancement(), Ok(true))
            && execute!(
                io::stdout(),
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )
            .is_ok();
        Ok(Self { enhanced })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.enhanced {
            let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
        }
        let _ = terminal::disable_raw_mode();
    }
}
