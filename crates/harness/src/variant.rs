use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use std::path::PathBuf;

use crate::assert::{Assertions, AssertionRecord, ROM_WINDOW};
use crate::observe::{ObservationSet, Probe};
use crate::script::{Button, Script};
use crate::Error;

/// Zero page and RAM locations of the game under test.
pub mod addr {
    pub const PLAYER_X: u16 = 0x05;
    pub const PLAYER_Y: u16 = 0x06;
    pub const FRAME_COUNTER: u16 = 0x0A;
    pub const NMI_READY: u16 = 0x10;
    pub const BULLET_TABLE: u16 = 0x0300;
    pub const BULLET_TABLE_LEN: u16 = 8;

    pub const MINIMAL_COUNTER: u16 = 0x00;
    pub const MINIMAL_SENTINEL: u16 = 0x01;
}

pub const PLAYER_START: (u32, u32) = (0x78, 0xC8);
pub const MINIMAL_SENTINEL_VALUE: u32 = 0x99;

const FRAME_COUNTER_MODULUS: u32 = 256;
const FUZZ_ROUNDS: usize = 5;
const FUZZ_ROUND_FRAMES: u32 = 60;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VariantKind {
    RomLoad,
    RomExecution,
    Gameplay,
    GameState,
    MinimalRom,
    FullInit,
}

impl VariantKind {
    pub const ALL: [VariantKind; 6] = [
        VariantKind::RomLoad,
        VariantKind::RomExecution,
        VariantKind::Gameplay,
        VariantKind::GameState,
        VariantKind::MinimalRom,
        VariantKind::FullInit,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            VariantKind::RomLoad => "rom-load",
            VariantKind::RomExecution => "rom-execution",
            VariantKind::Gameplay => "gameplay",
            VariantKind::GameState => "game-state",
            VariantKind::MinimalRom => "minimal-rom",
            VariantKind::FullInit => "full-init",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            VariantKind::RomLoad => "ROM LOAD",
            VariantKind::RomExecution => "ROM EXECUTION",
            VariantKind::Gameplay => "GAMEPLAY",
            VariantKind::GameState => "GAME STATE",
            VariantKind::MinimalRom => "MINIMAL ROM",
            VariantKind::FullInit => "FULL GAME INITIALIZATION",
        }
    }

    /// Each variant listens on its own port so suites can run in parallel.
    pub fn default_port(&self) -> u16 {
        match self {
            VariantKind::RomLoad => 8765,
            VariantKind::RomExecution => 8766,
            VariantKind::Gameplay => 8767,
            VariantKind::GameState => 8768,
            VariantKind::MinimalRom => 8769,
            VariantKind::FullInit => 8770,
        }
    }

    pub fn default_rom(&self) -> PathBuf {
        match self {
            VariantKind::MinimalRom => PathBuf::from("build/test_minimal.nes"),
            _ => PathBuf::from("build/stellar-assault.nes"),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.name() == name)
    }
}

impl std::fmt::Display for VariantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A test variant: an interaction script plus the assertions evaluated over
/// what it observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    kind: VariantKind,
    seed: u64,
}

impl Variant {
    pub fn new(kind: VariantKind) -> Self {
        Self { kind, seed: 0 }
    }

    /// Seed for the random rounds of the gameplay variant.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn kind(&self) -> VariantKind {
        self.kind
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The seed that reproduces this variant's script, for variants whose
    /// script depends on it.
    pub fn replay_seed(&self) -> Option<u64> {
        match self.kind {
            VariantKind::Gameplay => Some(self.seed),
            _ => None,
        }
    }

    pub fn script(&self) -> Script {
        match self.kind {
            VariantKind::RomLoad => Script::new().load_rom(),
            VariantKind::RomExecution => Script::new().load_rom().run("execution", 60),
            VariantKind::Gameplay => self.gameplay_script(),
            VariantKind::GameState => game_state_script(),
            VariantKind::MinimalRom => Script::new()
                .load_rom()
                .snapshot("initial", [Probe::mem("mem_00", addr::MINIMAL_COUNTER), Probe::Pc])
                .frames(60)
                .snapshot(
                    "after",
                    [
                        Probe::mem("mem_00", addr::MINIMAL_COUNTER),
                        Probe::mem("mem_01", addr::MINIMAL_SENTINEL),
                        Probe::Pc,
                    ],
                ),
            VariantKind::FullInit => Script::new()
                .load_rom()
                .snapshot("before_frames", game_probes())
                .frames(1)
                .snapshot("after_1_frame", game_probes())
                .frames(119)
                .snapshot("after_120_frames", game_probes()),
        }
    }

    /// The random rounds drawn for the gameplay variant, as
    /// (direction, fire held) pairs.
    pub fn fuzz_rounds(&self) -> Vec<(Button, bool)> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        (0..FUZZ_ROUNDS)
            .map(|_| {
                let dir = Button::DIRECTIONS[rng.gen_range(0..Button::DIRECTIONS.len())];
                (dir, rng.gen_bool(0.5))
            })
            .collect()
    }

    fn gameplay_script(&self) -> Script {
        let mut script = Script::new()
            .load_rom()
            .run("initial", 60)
            .hold_run("right", &[Button::Right], 30)
            .hold_run("fire", &[Button::FIRE], 10);

        for (round, (dir, fire)) in self.fuzz_rounds().into_iter().enumerate() {
            debug!(round, %dir, fire, "gameplay round");
            let mut buttons = vec![dir];
            if fire {
                buttons.push(Button::FIRE);
            }
            script = script.hold_run(round_label(round), &buttons, FUZZ_ROUND_FRAMES);
        }

        script
            .snapshot("pc_before", [Probe::Pc])
            .frames(10)
            .snapshot("pc_after", [Probe::Pc])
    }

    pub fn evaluate(&self, obs: &ObservationSet) -> Vec<AssertionRecord> {
        let mut a = Assertions::new();

        match self.kind {
            VariantKind::RomLoad => {
                rom_loaded(&mut a, obs);
            }
            VariantKind::RomExecution => {
                if rom_loaded(&mut a, obs) {
                    a.run_clean("Execution (60 frames)", "execution", obs.run("execution"));
                }
            }
            VariantKind::Gameplay => evaluate_gameplay(&mut a, obs),
            VariantKind::GameState | VariantKind::MinimalRom | VariantKind::FullInit
                if obs.load_fault.is_some() =>
            {
                rom_loaded(&mut a, obs);
            }
            VariantKind::GameState => evaluate_game_state(&mut a, obs),
            VariantKind::MinimalRom => evaluate_minimal(&mut a, obs),
            VariantKind::FullInit => evaluate_full_init(&mut a, obs),
        }

        if let Some(fault) = &obs.fault {
            if obs.load_fault.is_none() {
                let details = match fault.frame {
                    Some(frame) => format!(
                        "aborted at {}: {}",
                        fault.step,
                        Error::EngineRuntimeFault {
                            frame,
                            message: fault.message.clone(),
                        }
                    ),
                    None => format!("aborted at {}: {}", fault.step, fault.message),
                };
                a.check("Script completed", false, details);
            }
        }

        a.into_records()
    }
}

fn round_label(round: usize) -> String {
    format!("round_{round}")
}

fn game_probes() -> [Probe; 5] {
    [
        Probe::mem("player_x", addr::PLAYER_X),
        Probe::mem("player_y", addr::PLAYER_Y),
        Probe::mem("frame_counter", addr::FRAME_COUNTER),
        Probe::mem("nmi_ready", addr::NMI_READY),
        Probe::Pc,
    ]
}

fn bullet_probe() -> Probe {
    Probe::table("bullet_table", addr::BULLET_TABLE, addr::BULLET_TABLE_LEN)
}

fn game_state_script() -> Script {
    let position = || {
        [
            Probe::mem("player_x", addr::PLAYER_X),
            Probe::mem("player_y", addr::PLAYER_Y),
            Probe::mem("frame_counter", addr::FRAME_COUNTER),
        ]
    };

    Script::new()
        .load_rom()
        .frames(120)
        .snapshot("initial", position())
        .hold(Button::Right, 60)
        .snapshot("after_right", position())
        .hold(Button::Left, 60)
        .snapshot("after_left", position())
        .frames(60)
        .snapshot("after_idle", position())
        .snapshot("bullets_before", [bullet_probe()])
        .hold(Button::FIRE, 20)
        .snapshot("bullets_after", [bullet_probe()])
        .run("stability", 600)
}

fn rom_loaded(a: &mut Assertions, obs: &ObservationSet) -> bool {
    let details = match &obs.load_fault {
        Some(fault) => Error::EngineLoadFault(fault.clone()).to_string(),
        None if obs.loaded => "ROM loaded successfully".to_string(),
        None => "ROM was not loaded".to_string(),
    };
    a.check("ROM loading", obs.loaded && obs.load_fault.is_none(), details)
}

fn evaluate_full_init(a: &mut Assertions, obs: &ObservationSet) {
    let (x, y) = PLAYER_START;
    a.exact(
        "Player X initialized",
        "player_x",
        obs.value("after_1_frame", "player_x"),
        x,
    );
    a.exact(
        "Player Y initialized",
        "player_y",
        obs.value("after_1_frame", "player_y"),
        y,
    );
    a.nonzero(
        "Frame counter running",
        "frame_counter",
        obs.value("after_120_frames", "frame_counter"),
    );
}

fn evaluate_game_state(a: &mut Assertions, obs: &ObservationSet) {
    a.present(
        "Player initialized",
        &[
            ("X", obs.value("initial", "player_x")),
            ("Y", obs.value("initial", "player_y")),
        ],
    );
    a.increased(
        "Movement RIGHT works",
        "X",
        obs.value("initial", "player_x"),
        obs.value("after_right", "player_x"),
    );
    a.decreased(
        "Movement LEFT works",
        "X",
        obs.value("after_right", "player_x"),
        obs.value("after_left", "player_x"),
    );
    a.counter_delta(
        "Frame counter incrementing",
        "frame_counter",
        obs.value("after_left", "frame_counter"),
        obs.value("after_idle", "frame_counter"),
        60,
        FRAME_COUNTER_MODULUS,
    );

    let table = |label: &str| {
        obs.snapshot(label)
            .map(|s| s.table("bullet_table", addr::BULLET_TABLE_LEN))
            .unwrap_or_default()
    };
    a.changed(
        "Shooting creates bullets",
        "bullet_table",
        &table("bullets_before"),
        &table("bullets_after"),
    );
    a.run_clean("Stability (600 frames)", "stability", obs.run("stability"));
}

fn evaluate_gameplay(a: &mut Assertions, obs: &ObservationSet) {
    if !rom_loaded(a, obs) {
        return;
    }

    a.run_clean("Initial execution", "initial", obs.run("initial"));
    a.run_clean("Controller input (RIGHT)", "right", obs.run("right"));
    a.run_clean("Shooting (A button)", "fire", obs.run("fire"));

    let mut frames = 0;
    let mut crash = None;
    let mut captured = 0;
    for round in 0..FUZZ_ROUNDS {
        let Some(run) = obs.run(&round_label(round)) else {
            continue;
        };
        captured += 1;
        frames += run.completed;
        if crash.is_none() {
            if let Some(fault) = &run.fault {
                crash = Some(format!(
                    "crashed at frame {}: {}",
                    frames, fault.message
                ));
            }
        }
    }

    match crash {
        Some(details) => a.check("Extended gameplay (5 rounds)", false, details),
        None if captured < FUZZ_ROUNDS => a.check(
            "Extended gameplay (5 rounds)",
            false,
            format!("{captured}/{FUZZ_ROUNDS} rounds captured"),
        ),
        None => a.check(
            "Extended gameplay (5 rounds)",
            true,
            format!("ran {frames} frames successfully"),
        ),
    };

    let before = obs.value("pc_before", "pc");
    a.in_range("CPU program counter", "PC", before, ROM_WINDOW);

    match (before, obs.value("pc_after", "pc")) {
        (Some(before), Some(after)) => a.check(
            "CPU progress",
            before != after,
            if before != after {
                format!("PC moved ${before:04X} -> ${after:04X}")
            } else {
                format!("CPU appears stuck at ${before:04X}")
            },
        ),
        _ => a.check("CPU progress", false, "PC not captured"),
    };
}

fn evaluate_minimal(a: &mut Assertions, obs: &ObservationSet) {
    a.exact(
        "Sentinel written",
        "$01",
        obs.value("after", "mem_01"),
        MINIMAL_SENTINEL_VALUE,
    );

    match (obs.value("initial", "mem_00"), obs.value("after", "mem_00")) {
        (Some(initial), Some(after)) => {
            let increments = crate::assert::wrapping_delta(initial, after, 256);
            a.check(
                "Memory changing",
                initial != after,
                format!("$00: ${initial:02X} -> ${after:02X}, incremented {increments} times"),
            )
        }
        _ => a.check("Memory changing", false, "$00 not captured"),
    };
}
