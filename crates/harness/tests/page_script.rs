//! Runs rendered interaction scripts in an embedded javascript engine
//! against a stand-in for the jsnes globals.

use boa_engine::{Context, Source};
use harness::{codec, Button, EngineBindings, ObservationSet, Probe, Script, Variant, VariantKind};

const FAKE_ENGINE: &str = include_str!("page/fake_engine.js");

struct Page {
    context: Context,
}

impl Page {
    fn new() -> Self {
        let mut context = Context::default();
        context.eval(Source::from_bytes(FAKE_ENGINE)).unwrap();
        Self { context }
    }

    fn eval(&mut self, js: &str) -> String {
        let value = self.context.eval(Source::from_bytes(js)).unwrap();
        value
            .to_string(&mut self.context)
            .unwrap()
            .to_std_string_escaped()
    }

    fn run(&mut self, script: &Script, rom: &[u8]) -> ObservationSet {
        let js = script.render(&EngineBindings::default(), &codec::encode(rom));
        ObservationSet::from_json(&self.eval(&js)).unwrap()
    }
}

fn rom() -> Vec<u8> {
    let mut rom = vec![78, 69, 83, 26, 0, 255, 128];
    rom.extend(0..=255u8);
    rom
}

#[test]
fn rom_bytes_survive_page_decoding() {
    let mut page = Page::new();
    let rom = rom();

    let obs = page.run(&Script::new().load_rom(), &rom);
    assert!(obs.loaded);
    assert_eq!(obs.load_fault, None);
    assert_eq!(obs.fault, None);

    let seen = page.eval("JSON.stringify(Array.from(window.nes.rom, (c) => c.charCodeAt(0)))");
    let seen: Vec<u8> = serde_json::from_str(&seen).unwrap();
    assert_eq!(seen, rom);
    assert_eq!(
        page.eval("window.nes.rom"),
        codec::decode(&codec::encode(&rom)).unwrap()
    );
}

#[test]
fn rejected_image_is_a_load_fault() {
    let mut page = Page::new();
    let obs = page.run(
        &Variant::new(VariantKind::FullInit).script(),
        b"UNIF\x00\x00\x00\x00",
    );

    assert!(!obs.loaded);
    assert_eq!(obs.load_fault.as_deref(), Some("Error: Not a valid NES ROM."));
    let fault = obs.fault.as_ref().unwrap();
    assert_eq!(fault.step, "0:load_rom");
    assert_eq!(fault.frame, Some(0));
    assert!(obs.snapshots.is_empty());

    let records = Variant::new(VariantKind::FullInit).evaluate(&obs);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "ROM loading");
    assert_eq!(
        records[0].details,
        "engine rejected rom: Error: Not a valid NES ROM."
    );
}

#[test]
fn held_button_moves_player_then_releases() {
    let mut page = Page::new();
    let script = Script::new()
        .load_rom()
        .hold(Button::Right, 3)
        .frames(2)
        .snapshot("after", [Probe::mem("player_x", 0x05), Probe::Pc]);

    let obs = page.run(&script, &rom());
    assert_eq!(obs.frames, 5);
    assert_eq!(obs.value("after", "player_x"), Some(3));
    assert_eq!(obs.value("after", "pc"), Some(0xc005));
    assert_eq!(page.eval("window.nes.held(1)"), "0");
}

#[test]
fn frames_fault_names_the_frame() {
    let mut page = Page::new();
    page.eval("window.nes.failAt = 4");

    let obs = page.run(
        &Script::new()
            .load_rom()
            .frames(10)
            .snapshot("unreached", [Probe::Pc]),
        &rom(),
    );
    assert!(obs.loaded);
    assert_eq!(obs.frames, 4);
    let fault = obs.fault.as_ref().unwrap();
    assert_eq!(fault.step, "1:frames(10)");
    assert_eq!(fault.frame, Some(4));
    assert_eq!(fault.message, "Error: frame 4 failed");
    assert!(obs.snapshot("unreached").is_none());
}

#[test]
fn run_fault_is_recorded_and_script_continues() {
    let mut page = Page::new();
    page.eval("window.nes.failAt = 7");

    let obs = page.run(
        &Script::new()
            .load_rom()
            .hold_run("stability", &[Button::Right], 20)
            .snapshot("after", [Probe::mem("player_x", 0x05)]),
        &rom(),
    );
    assert_eq!(obs.fault, None);
    let run = obs.run("stability").unwrap();
    assert_eq!(run.completed, 7);
    assert_eq!(run.fault.as_ref().map(|f| f.frame), Some(7));
    assert_eq!(obs.value("after", "player_x"), Some(7));
    assert_eq!(page.eval("window.nes.held(1)"), "0");
}

#[test]
fn minimal_variant_passes_against_stand_in() {
    let mut page = Page::new();
    let variant = Variant::new(VariantKind::MinimalRom);

    let obs = page.run(&variant.script(), &rom());
    let records = variant.evaluate(&obs);
    assert!(records.iter().all(|r| r.passed), "{records:?}");
    assert_eq!(records[1].details, "$00: $00 -> $3C, incremented 60 times");
}
