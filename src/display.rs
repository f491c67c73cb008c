//! Preview window and keyboard controls.
//!
//! Keys: `Tab` next feature, `H`/`W`/`X`/`Y`/`R` pick a control,
//! `Up`/`Down` nudge it, `Space` toggles the feature, `Backspace` resets
//! every control, `D` goes back to the default hat, `Esc` quits.

use anyhow::Result;
use image::RgbImage;
use minifb::{Key, KeyRepeat, WindowOptions};
use vmask_vision::FeatureKind;

use crate::controls::{Control, ControlPanel, HatVisual};
use crate::error::StartupError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    NextFeature,
    Select(Control),
    Step(i32),
    Toggle,
    ResetAll,
    DefaultHat,
}

pub fn action_for(key: Key) -> Option<Action> {
    Some(match key {
        Key::Tab => Action::NextFeature,
        Key::H => Action::Select(Control::Height),
        Key::W => Action::Select(Control::Width),
        Key::X => Action::Select(Control::X),
        Key::Y => Action::Select(Control::Y),
        Key::R => Action::Select(Control::Rotation),
        Key::Up => Action::Step(1),
        Key::Down => Action::Step(-1),
        Key::Space => Action::Toggle,
        Key::Backspace => Action::ResetAll,
        Key::D => Action::DefaultHat,
        _ => return None,
    })
}

/// Which feature and control the arrow keys act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub kind: FeatureKind,
    pub control: Control,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            kind: FeatureKind::LeftEye,
            control: Control::Width,
        }
    }
}

impl Selection {
    pub fn apply(&mut self, panel: &mut ControlPanel, action: Action) {
        match action {
            Action::NextFeature => self.kind = self.kind.next(),
            Action::Select(control) => self.control = control,
            Action::Step(steps) => {
                panel.step(self.kind, self.control, steps);
            }
            Action::Toggle => {
                let on = panel.toggle_enabled(self.kind);
                log::info!("{} {}", self.kind, if on { "enabled" } else { "disabled" });
            }
            Action::ResetAll => panel.reset_all(),
            Action::DefaultHat => {
                panel.use_default_hat();
                log::info!("hat reverted to default shape");
            }
        }
    }

    /// Window title showing the selection and its current readout.
    pub fn title(&self, panel: &ControlPanel) -> String {
        let state = if panel.spec(self.kind).enabled { "on" } else { "off" };
        let hat = match panel.hat() {
            HatVisual::Default => "default",
            HatVisual::Custom(_) => "custom",
        };
        format!(
            "vmask | {} [{}] | {} {} | hat: {}",
            self.kind,
            state,
            self.control.label(),
            panel.readout(self.kind, self.control),
            hat
        )
    }
}

/// Pack RGB pixels as `0x00RRGGBB` for minifb.
pub fn pack_rgb(frame: &RgbImage, out: &mut Vec<u32>) {
    out.clear();
    out.extend(
        frame
            .pixels()
            .map(|p| ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32),
    );
}

/// Where composited frames are shown and user input comes from.
pub trait Preview {
    fn is_open(&self) -> bool;
    /// Apply pending input to the panel. Returns whether anything changed.
    fn handle_input(&mut self, panel: &mut ControlPanel) -> bool;
    fn present(&mut self, frame: &RgbImage) -> Result<()>;
    /// Keep the preview responsive on a tick with nothing new to show.
    fn idle(&mut self);
}

pub struct Window {
    window: minifb::Window,
    buffer: Vec<u32>,
    selection: Selection,
}

impl Window {
    pub fn open(width: u32, height: u32, panel: &ControlPanel) -> Result<Self, StartupError> {
        let selection = Selection::default();
        let window = minifb::Window::new(
            &selection.title(panel),
            width as usize,
            height as usize,
            WindowOptions::default(),
        )
        .map_err(|e| StartupError::Window(e.to_string()))?;
        Ok(Self {
            window,
            buffer: Vec::with_capacity((width * height) as usize),
            selection,
        })
    }
}

impl Preview for Window {
    /// False once the window is closed or Esc is held.
    fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    fn handle_input(&mut self, panel: &mut ControlPanel) -> bool {
        let actions: Vec<Action> = self
            .window
            .get_keys_pressed(KeyRepeat::Yes)
            .into_iter()
            .filter_map(action_for)
            .collect();
        if actions.is_empty() {
            return false;
        }
        for action in actions {
            self.selection.apply(panel, action);
        }
        self.window.set_title(&self.selection.title(panel));
        true
    }

    fn present(&mut self, frame: &RgbImage) -> Result<()> {
        pack_rgb(frame, &mut self.buffer);
        self.window
            .update_with_buffer(&self.buffer, frame.width() as usize, frame.height() as usize)
            .map_err(|e| anyhow::anyhow!("window update: {e}"))
    }

    /// minifb only processes window events inside `update*`.
    fn idle(&mut self) {
        self.window.update();
    }
}
