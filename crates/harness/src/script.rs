use serde::{Deserialize, Serialize};

use std::fmt::Write;

use crate::codec;
use crate::observe::Probe;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Button {
    A,
    B,
    Select,
    Start,
    Up,
    Down,
    Left,
    Right,
}

impl Button {
    pub const DIRECTIONS: [Button; 4] = [Button::Up, Button::Down, Button::Left, Button::Right];

    /// Fire is mapped to A.
    pub const FIRE: Button = Button::A;

    fn constant(&self) -> &'static str {
        match self {
            Button::A => "BUTTON_A",
            Button::B => "BUTTON_B",
            Button::Select => "BUTTON_SELECT",
            Button::Start => "BUTTON_START",
            Button::Up => "BUTTON_UP",
            Button::Down => "BUTTON_DOWN",
            Button::Left => "BUTTON_LEFT",
            Button::Right => "BUTTON_RIGHT",
        }
    }
}

impl std::fmt::Display for Button {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Button::A => "A",
            Button::B => "B",
            Button::Select => "SELECT",
            Button::Start => "START",
            Button::Up => "UP",
            Button::Down => "DOWN",
            Button::Left => "LEFT",
            Button::Right => "RIGHT",
        };
        f.write_str(name)
    }
}

/// Javascript expressions used to reach the engine inside the page.
///
/// `handle` and `buttons` are evaluated once, outside the script body, and
/// passed in as arguments. `memory` and `pc` are evaluated relative to the
/// `engine` argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineBindings {
    pub handle: String,
    pub buttons: String,
    pub memory: String,
    pub pc: String,
    pub pad: u8,
}

impl Default for EngineBindings {
    fn default() -> Self {
        Self {
            handle: "window.nes".into(),
            buttons: "window.jsnes.Controller".into(),
            memory: "engine.cpu.mem".into(),
            pc: "engine.cpu.REG_PC".into(),
            pad: 1,
        }
    }
}

impl EngineBindings {
    /// Expression that is true once the engine handle exists and can step.
    pub fn ready_expression(&self) -> String {
        format!(
            "(function () {{ try {{ const engine = {}; \
             return !!engine && typeof engine.frame === 'function'; \
             }} catch (_) {{ return false; }} }})()",
            self.handle
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    LoadRom,
    Frames(u32),
    Press(Button),
    Release(Button),
    Snapshot { label: String, probes: Vec<Probe> },
    /// Steps frames one at a time, recording the index of a faulting frame
    /// instead of aborting the script.
    Run { label: String, frames: u32 },
}

/// Ordered interaction with the engine, executed inside the page as a
/// single evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    steps: Vec<Step>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn load_rom(mut self) -> Self {
        self.steps.push(Step::LoadRom);
        self
    }

    pub fn frames(mut self, frames: u32) -> Self {
        self.steps.push(Step::Frames(frames));
        self
    }

    pub fn press(mut self, button: Button) -> Self {
        self.steps.push(Step::Press(button));
        self
    }

    pub fn release(mut self, button: Button) -> Self {
        self.steps.push(Step::Release(button));
        self
    }

    /// Holds `button` down for `frames` frames, releasing it afterwards.
    pub fn hold(self, button: Button, frames: u32) -> Self {
        self.press(button).frames(frames).release(button)
    }

    pub fn snapshot<L: Into<String>, P: IntoIterator<Item = Probe>>(
        mut self,
        label: L,
        probes: P,
    ) -> Self {
        self.steps.push(Step::Snapshot {
            label: label.into(),
            probes: probes.into_iter().collect(),
        });
        self
    }

    pub fn run<L: Into<String>>(mut self, label: L, frames: u32) -> Self {
        self.steps.push(Step::Run {
            label: label.into(),
            frames,
        });
        self
    }

    /// Holds every button in `buttons` for a fault checked run.
    pub fn hold_run<L: Into<String>>(self, label: L, buttons: &[Button], frames: u32) -> Self {
        let mut script = self;
        for &b in buttons {
            script = script.press(b);
        }
        script = script.run(label, frames);
        for &b in buttons {
            script = script.release(b);
        }
        script
    }

    /// Total frames the script asks the engine to step.
    pub fn frame_count(&self) -> u64 {
        self.steps
            .iter()
            .map(|s| match s {
                Step::Frames(n) | Step::Run { frames: n, .. } => *n as u64,
                _ => 0,
            })
            .sum()
    }

    /// Renders the script as a self-invoking function expression. The page
    /// returns the observation set serialized as a JSON string.
    pub fn render(&self, bindings: &EngineBindings, rom_base64: &str) -> String {
        let mut js = String::new();

        let _ = writeln!(js, "(function (engine, buttons, rom) {{");
        let _ = writeln!(js, "  \"use strict\";");
        let _ = writeln!(
            js,
            "  const obs = {{ loaded: false, load_fault: null, fault: null, frames: 0, snapshots: {{}}, runs: {{}} }};"
        );
        let _ = writeln!(js, "  const mem = (addr) => {}[addr];", bindings.memory);
        let _ = writeln!(js, "  const pc = () => {};", bindings.pc);
        let _ = writeln!(js, "  const step = () => {{ engine.frame(); obs.frames += 1; }};");
        let _ = writeln!(js, "  {}", codec::PAGE_DECODER);
        let _ = writeln!(js, "  let at = \"start\";");
        let _ = writeln!(js, "  try {{");

        for (idx, step) in self.steps.iter().enumerate() {
            self.render_step(&mut js, idx, step, bindings);
        }

        let _ = writeln!(js, "  }} catch (e) {{");
        let _ = writeln!(js, "    obs.fault = {{ step: at, frame: obs.frames, message: String(e) }};");
        let _ = writeln!(js, "  }}");
        let _ = writeln!(js, "  return JSON.stringify(obs);");
        let _ = write!(
            js,
            "}})({}, {}, {})",
            bindings.handle,
            bindings.buttons,
            js_string(rom_base64)
        );

        js
    }

    fn render_step(&self, js: &mut String, idx: usize, step: &Step, bindings: &EngineBindings) {
        let pad = bindings.pad;
        let _ = writeln!(js, "    at = {};", js_string(&step_name(idx, step)));
        match step {
            Step::LoadRom => {
                let _ = writeln!(
                    js,
                    "    try {{ engine.loadROM(decodeRom(rom)); obs.loaded = true; }} \
                     catch (e) {{ obs.load_fault = String(e); throw e; }}"
                );
            }
            Step::Frames(n) => {
                let _ = writeln!(js, "    for (let i = 0; i < {n}; i++) step();");
            }
            Step::Press(b) => {
                let _ = writeln!(js, "    engine.buttonDown({pad}, buttons.{});", b.constant());
            }
            Step::Release(b) => {
                let _ = writeln!(js, "    engine.buttonUp({pad}, buttons.{});", b.constant());
            }
            Step::Snapshot { label, probes } => {
                let mut fields = Vec::new();
                for probe in probes {
                    for (key, addr) in probe.keys() {
                        let read = match addr {
                            Some(addr) => format!("mem(0x{addr:04X})"),
                            None => "pc()".to_string(),
                        };
                        fields.push(format!("{}: {read}", js_string(&key)));
                    }
                }
                let _ = writeln!(
                    js,
                    "    obs.snapshots[{}] = {{ {} }};",
                    js_string(label),
                    fields.join(", ")
                );
            }
            Step::Run { label, frames } => {
                let _ = writeln!(js, "    {{");
                let _ = writeln!(
                    js,
                    "      const run = {{ requested: {frames}, completed: 0, fault: null }};"
                );
                let _ = writeln!(js, "      for (let i = 0; i < {frames}; i++) {{");
                let _ = writeln!(
                    js,
                    "        try {{ step(); run.completed += 1; }} \
                     catch (e) {{ run.fault = {{ frame: i, message: String(e) }}; break; }}"
                );
                let _ = writeln!(js, "      }}");
                let _ = writeln!(js, "      obs.runs[{}] = run;", js_string(label));
                let _ = writeln!(js, "    }}");
            }
        }
    }
}

fn step_name(idx: usize, step: &Step) -> String {
    match step {
        Step::LoadRom => format!("{idx}:load_rom"),
        Step::Frames(n) => format!("{idx}:frames({n})"),
        Step::Press(b) => format!("{idx}:press({b})"),
        Step::Release(b) => format!("{idx}:release({b})"),
        Step::Snapshot { label, .. } => format!("{idx}:snapshot({label})"),
        Step::Run { label, frames } => format!("{idx}:run({label}, {frames})"),
    }
}

fn js_string(s: &str) -> String {
    // JSON strings are valid javascript string literals
    serde_json::Value::String(s.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hold_releases_after_frames() {
        let script = Script::new().load_rom().hold(Button::Right, 60);
        assert_eq!(
            script.steps(),
            &[
                Step::LoadRom,
                Step::Press(Button::Right),
                Step::Frames(60),
                Step::Release(Button::Right),
            ]
        );
    }

    #[test]
    fn hold_run_wraps_all_buttons() {
        let script = Script::new().hold_run("round", &[Button::Up, Button::A], 60);
        assert_eq!(
            script.steps(),
            &[
                Step::Press(Button::Up),
                Step::Press(Button::A),
                Step::Run {
                    label: "round".into(),
                    frames: 60
                },
                Step::Release(Button::Up),
                Step::Release(Button::A),
            ]
        );
        assert_eq!(script.frame_count(), 60);
    }

    #[test]
    fn render_passes_handle_as_argument() {
        let bindings = EngineBindings::default();
        let js = Script::new()
            .load_rom()
            .frames(1)
            .snapshot("after", [Probe::mem("player_x", 0x05), Probe::Pc])
            .render(&bindings, "TkVTGg==");

        assert!(js.starts_with("(function (engine, buttons, rom) {"));
        assert!(js.ends_with("})(window.nes, window.jsnes.Controller, \"TkVTGg==\")"));
        assert!(!js.contains("window.nes.frame"));
        assert!(js.contains("engine.loadROM(decodeRom(rom))"));
        assert!(js.contains("for (let i = 0; i < 1; i++) step();"));
        assert!(js.contains(r#"obs.snapshots["after"] = { "player_x": mem(0x0005), "pc": pc() };"#));
        assert!(js.contains("const mem = (addr) => engine.cpu.mem[addr];"));
    }

    #[test]
    fn render_uses_configured_pad_and_buttons() {
        let bindings = EngineBindings {
            pad: 2,
            ..Default::default()
        };
        let js = Script::new()
            .hold(Button::Left, 3)
            .render(&bindings, "");

        assert!(js.contains("engine.buttonDown(2, buttons.BUTTON_LEFT);"));
        assert!(js.contains("engine.buttonUp(2, buttons.BUTTON_LEFT);"));
    }

    #[test]
    fn script_fault_records_frames_completed() {
        let js = Script::new().frames(10).render(&EngineBindings::default(), "");
        assert!(js.contains("obs.fault = { step: at, frame: obs.frames, message: String(e) };"));
        assert!(js.contains("const step = () => { engine.frame(); obs.frames += 1; };"));
    }

    #[test]
    fn labels_are_escaped() {
        let js = Script::new()
            .run("a\"b", 1)
            .render(&EngineBindings::default(), "");
        assert!(js.contains(r#"obs.runs["a\"b"] = run;"#));
    }

    #[test]
    fn ready_expression_checks_frame_function() {
        let expr = EngineBindings::default().ready_expression();
        assert!(expr.contains("const engine = window.nes;"));
        assert!(expr.contains("typeof engine.frame === 'function'"));
    }
}
