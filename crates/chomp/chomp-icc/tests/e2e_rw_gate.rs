//! Multi-process test for the turnstile reader-writer gate.
//!
//! # Overview
//!
//! One writer process and several reader processes attach to the same pair of
//! shared regions and hammer the lock **concurrently**. The writer repeatedly
//! overwrites every cell of the grid with a new generation number; readers
//! check under the reader role that the grid is never observed half-written.
//!
//! ```text
//!                    Time -->
//!
//! [Parent]  --[create regions]--[spawn]---------------------[wait]--[check]
//!                                  |
//! [Writer]  -----------------------+--[gen 1]--[gen 2]--...--[finished]
//! [Reader]  -----------------------+--[read]--[read]--[read]--...--[exit]
//! [Reader]  -----------------------+----[read]--[read]--[read]--...--[exit]
//! ```
//!
//! The same test binary is re-executed with an environment variable naming
//! the role of each child.
//!
//! # Running the Test
//!
//! ```bash
//! cargo test -p chomp-icc --test e2e_rw_gate -- --nocapture
//! ```

use chomp_icc::{Ipc, STATE_SHM_ENV, SYNC_SHM_ENV, ShmNames};
use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Writes to stderr with immediate flush to bypass test output capture.
macro_rules! log {
    ($($arg:tt)*) => {{
        let _ = writeln!(std::io::stderr(), $($arg)*);
        let _ = std::io::stderr().flush();
    }};
}

const ENV_ROLE: &str = "CHOMP_E2E_ROLE";
const ROLE_WRITER: &str = "writer";
const ROLE_READER: &str = "reader";

const TEST_NAME: &str = "e2e_cross_process_rw_gate";

const GENERATIONS: i32 = 2_000;
const READERS: usize = 3;
const BOARD: u16 = 16;

/// Give up instead of hanging the suite if the protocol deadlocks.
const CHILD_DEADLINE: Duration = Duration::from_secs(30);

fn test_names() -> ShmNames {
    let pid = std::process::id();
    ShmNames::new(
        format!("/chomp_e2e_state_{pid}"),
        format!("/chomp_e2e_sync_{pid}"),
    )
}

fn run_writer(names: &ShmNames) {
    let mut ipc = Ipc::attach(names).expect("writer: attach");
    // second mapping, so the counter is read the way any other process sees it
    let observer = Ipc::attach(names).expect("writer: observer attach");
    let start = Instant::now();

    for generation in 1..=GENERATIONS {
        let readers_inside;
        {
            let mut world = ipc.write().expect("writer: enter");
            readers_inside = observer.sync().readers();
            world.raw_cells_mut().fill(generation);
            world.header_mut().num_agents = 1;
            world.agent_mut(0).expect("slot 0").score = generation as u32;
        }
        assert_eq!(readers_inside, 0, "reader inside while writer held the room");

        if generation % 500 == 0 {
            log!("[WRITER] generation {generation}/{GENERATIONS}");
        }
        assert!(start.elapsed() < CHILD_DEADLINE, "writer stalled");
    }

    ipc.write().expect("writer: final enter").set_finished();
    log!("[WRITER] done in {:?}", start.elapsed());
}

fn run_reader(names: &ShmNames) {
    let ipc = Ipc::attach(names).expect("reader: attach");
    let start = Instant::now();
    let mut last_generation = 0;
    let mut reads = 0u64;

    loop {
        let world = ipc.read().expect("reader: enter");
        assert!(ipc.sync().readers() >= 1, "reader inside but counter is zero");

        let cells = world.raw_cells();
        let generation = cells[0];
        assert!(
            cells.iter().all(|&c| c == generation),
            "torn grid observed at generation {generation}"
        );
        if generation > 0 {
            assert_eq!(world.agent(0).map(|a| a.score), Some(generation as u32));
        }
        assert!(generation >= last_generation, "generation went backwards");
        last_generation = generation;
        reads += 1;

        let finished = world.is_finished();
        drop(world);
        if finished {
            break;
        }
        assert!(start.elapsed() < CHILD_DEADLINE, "reader never saw the end");
    }

    log!(
        "[READER {}] {reads} consistent reads, last generation {last_generation}",
        std::process::id()
    );
}

#[test]
fn e2e_cross_process_rw_gate() {
    if let Ok(role) = env::var(ENV_ROLE) {
        let names = ShmNames::from_env();
        match role.as_str() {
            ROLE_WRITER => run_writer(&names),
            ROLE_READER => run_reader(&names),
            other => panic!("Unknown role: {other}"),
        }
        return;
    }

    let names = test_names();
    let exe = env::current_exe().expect("Failed to get current executable path");
    let _ = Ipc::destroy(&names);
    let (ipc, existed) = Ipc::create(&names, BOARD, BOARD).expect("create regions");
    assert!(!existed);

    let spawn = |role: &str| {
        Command::new(&exe)
            .arg("--exact")
            .arg(TEST_NAME)
            .env(ENV_ROLE, role)
            .env(STATE_SHM_ENV, &names.state)
            .env(SYNC_SHM_ENV, &names.sync)
            .stderr(Stdio::inherit())
            .spawn()
            .expect("Failed to spawn child")
    };

    log!("[PARENT] spawning {READERS} readers and one writer");
    let mut children: Vec<_> = (0..READERS).map(|_| spawn(ROLE_READER)).collect();
    children.push(spawn(ROLE_WRITER));

    let statuses: Vec<_> = children
        .iter_mut()
        .map(|c| c.wait().expect("Failed to wait for child"))
        .collect();

    let sync = ipc.sync();
    let readers = sync.readers();
    let turnstile = sync.no_starve.value().unwrap();
    let room = sync.writer_lock.value().unwrap();
    let finished = ipc.read().unwrap().is_finished();

    ipc.detach();
    Ipc::destroy(&names).expect("destroy regions");

    for status in &statuses {
        assert!(status.success(), "child failed with status: {status}");
    }
    assert_eq!(readers, 0, "reader counter leaked");
    assert_eq!(turnstile, 1, "turnstile left closed");
    assert_eq!(room, 1, "room left locked");
    assert!(finished);
}
