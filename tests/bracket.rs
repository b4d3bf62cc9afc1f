use arena_ladder::prelude::*;
use tempfile::TempDir;

fn players(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn controller_in(dir: &TempDir) -> BracketController {
    BracketController::new(Configuration::new().with_data_dir(dir.path()))
}

fn four_player_controller(dir: &TempDir) -> BracketController {
    let mut controller = controller_in(dir);
    controller
        .initialize("gen1ou", &players(&["Alice", "Bob", "Carol", "Dave"]), 20, false)
        .unwrap();
    controller
}

fn win_series(controller: &mut BracketController, winner: &str, loser: &str, times: u32) {
    for _ in 0..times {
        controller.record_win(winner, loser);
    }
}

#[test]
fn four_players_pair_one_four_two_three() {
    let dir = tempfile::tempdir().unwrap();
    let controller = four_player_controller(&dir);

    // seed order 1,4,2,3: Alice vs Dave and Bob vs Carol
    assert!(controller.can_match("Alice", "Dave"));
    assert!(controller.can_match("Carol", "Bob"));
    assert!(!controller.can_match("Alice", "Bob"));
    assert!(!controller.can_match("Alice", "Carol"));
    assert!(controller.can_search("alice"));
    assert_eq!(controller.opponent_of("Alice").as_deref(), Some("dave"));

    let status = controller.status();
    assert!(status.contains("Round 1:"));
    assert!(status.contains("Alice vs Dave"));
    assert!(status.contains("Bob vs Carol"));
    assert!(status.contains("(awaiting players)"), "final not pre-allocated:\n{status}");
}

#[test]
fn best_of_twenty_needs_eleven_wins() {
    let dir = tempfile::tempdir().unwrap();
    let mut controller = four_player_controller(&dir);

    win_series(&mut controller, "Alice", "Dave", 10);
    // series still running at 10-0
    assert!(controller.can_match("Alice", "Dave"));

    controller.record_win("Alice", "Dave");
    // 11-0 completes the series; Alice waits in the final
    assert!(!controller.can_match("Alice", "Dave"));
    assert!(controller.can_search("Alice"));
    assert!(controller.opponent_of("Alice").is_none());
    assert!(!controller.can_search("Dave"));
    assert!(controller.status().contains("winner: Alice"));
}

#[test]
fn final_activates_once_both_semis_complete() {
    let dir = tempfile::tempdir().unwrap();
    let mut controller = four_player_controller(&dir);

    win_series(&mut controller, "Alice", "Dave", 11);
    win_series(&mut controller, "Bob", "Carol", 11);

    assert!(controller.can_match("Alice", "Bob"));
    assert!(!controller.can_match("Alice", "Carol"));
    assert_eq!(controller.opponent_of("alice").as_deref(), Some("bob"));

    // draws do not count: the final winner still needs eleven wins
    win_series(&mut controller, "Bob", "Alice", 11);
    assert!(!controller.can_search("Bob"));
    assert!(!controller.can_search("Alice"));
    assert!(controller.status().contains("winner: Bob"));
}

#[test]
fn results_for_strangers_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let mut controller = four_player_controller(&dir);

    // not an opponent pair, not a participant: both ignored
    controller.record_win("Alice", "Bob");
    controller.record_win("Nobody", "Alice");
    controller.record_win("Alice", "Nobody");

    assert!(controller.can_match("Alice", "Dave"));
    assert!(controller.status().contains("Alice vs Dave (0-0)"));
}

#[test]
fn force_win_completes_a_series_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let mut controller = four_player_controller(&dir);

    controller.record_win("Dave", "Alice");
    controller.force_win("Alice").unwrap();
    assert!(controller.status().contains("winner: Alice"));
    assert!(controller.can_search("Alice"));
    assert!(!controller.can_search("Dave"));

    // Alice waits in the final: no active series to force
    assert!(matches!(
        controller.force_win("Alice"),
        Err(TournamentError::NoActiveSeries(_))
    ));
    assert!(matches!(
        controller.force_win("Nobody"),
        Err(TournamentError::NoActiveSeries(_))
    ));
}

#[test]
fn initialize_validates_input() {
    let dir = tempfile::tempdir().unwrap();
    let mut controller = controller_in(&dir);

    assert!(matches!(
        controller.initialize("gen1ou", &players(&["A", "B", "C"]), 5, false),
        Err(TournamentError::BadParticipantCount(3))
    ));
    assert!(matches!(
        controller.initialize("gen1ou", &players(&["A", "B"]), 0, false),
        Err(TournamentError::BadBestOf(0))
    ));
    assert!(matches!(
        controller.initialize("gen1ou", &players(&["Alice", "alice"]), 5, false),
        Err(TournamentError::DuplicateParticipant(_))
    ));
    assert!(!controller.is_initialized());

    controller
        .initialize("gen1ou", &players(&["A", "B"]), 5, false)
        .unwrap();
    assert!(matches!(
        controller.initialize("gen1ou", &players(&["C", "D"]), 5, false),
        Err(TournamentError::AlreadyInitialized)
    ));
}

#[test]
fn randomized_seeding_keeps_everyone_in_round_one() {
    let dir = tempfile::tempdir().unwrap();
    let mut controller = controller_in(&dir);
    let names = ["P1", "P2", "P3", "P4", "P5", "P6", "P7", "P8"];
    controller
        .initialize("gen1ou", &players(&names), 3, true)
        .unwrap();
    for name in names {
        assert!(controller.can_search(name), "{name} missing from round 1");
        assert!(controller.opponent_of(name).is_some());
    }
}

#[test]
fn freeze_blocks_advancement_and_resume_replays_it() {
    let dir = tempfile::tempdir().unwrap();
    let mut controller = four_player_controller(&dir);

    controller.freeze().unwrap();
    assert!(controller.is_frozen());
    assert!(matches!(controller.freeze(), Err(TournamentError::AlreadyFrozen)));

    // both series complete while frozen, but nobody reaches the final
    win_series(&mut controller, "Alice", "Dave", 11);
    win_series(&mut controller, "Bob", "Carol", 11);
    let status = controller.status();
    assert!(status.contains("winner: Alice"));
    assert!(status.contains("winner: Bob"));
    assert!(status.contains("(awaiting players)"), "advanced while frozen:\n{status}");
    assert!(!controller.can_match("Alice", "Bob"));

    controller.resume().unwrap();
    assert!(!controller.is_frozen());
    assert!(controller.can_match("Alice", "Bob"));
    assert!(controller.status().contains("Alice vs Bob"));

    assert!(matches!(controller.resume(), Err(TournamentError::NotFrozen)));
}

#[test]
fn frozen_brackets_only_play_the_earliest_round() {
    let dir = tempfile::tempdir().unwrap();
    let mut controller = four_player_controller(&dir);

    // Alice advances to the final before the freeze
    win_series(&mut controller, "Alice", "Dave", 11);
    assert!(controller.can_search("Alice"));

    controller.freeze().unwrap();
    // round 1 is still the earliest incomplete round: Bob may play, Alice may not
    assert!(controller.can_search("Bob"));
    assert!(controller.can_match("Bob", "Carol"));
    assert!(!controller.can_search("Alice"));

    controller.resume().unwrap();
    assert!(controller.can_search("Alice"));
}

#[test]
fn resume_on_a_finished_tournament_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let mut controller = controller_in(&dir);
    controller
        .initialize("gen1ou", &players(&["A", "B"]), 1, false)
        .unwrap();

    controller.freeze().unwrap();
    controller.record_win("A", "B");
    assert!(controller.status().contains("winner: A"));
    // nothing to place: the completed match was the final
    controller.resume().unwrap();
    assert!(controller.status().contains("winner: A"));
}

#[test]
fn persisted_state_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let expected;
    {
        let mut controller = four_player_controller(&dir);
        win_series(&mut controller, "Alice", "Dave", 11);
        win_series(&mut controller, "Bob", "Carol", 4);
        controller.freeze().unwrap();
        expected = controller.status();
    }

    let mut reloaded = controller_in(&dir);
    reloaded.load_or_initialize();
    assert!(reloaded.is_initialized());
    assert!(reloaded.is_frozen());
    assert_eq!(reloaded.status(), expected);
    assert!(reloaded.can_match("Bob", "Carol"));
    assert!(!reloaded.can_search("Alice"));
}

#[test]
fn legacy_files_load_with_configured_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let legacy = "\
round,matchId,player1,player2,p1wins,p2wins,status,winner
1,1,alice,dave,11,7,complete,alice
1,2,bob,carol,5,4,active,
2,3,alice,,0,0,waiting,
";
    std::fs::write(dir.path().join("tournament.csv"), legacy).unwrap();

    let mut controller = BracketController::new(
        Configuration::new()
            .with_data_dir(dir.path())
            .with_format("gen1ou")
            .with_best_of(20),
    );
    controller.load_or_initialize();
    assert!(controller.is_initialized());
    assert!(!controller.is_frozen());
    assert!(controller.can_match("bob", "carol"));

    // finishing the semi final activates the final at the configured best-of
    win_series(&mut controller, "bob", "carol", 6);
    assert!(controller.can_match("alice", "bob"));
}

#[test]
fn unreadable_files_leave_the_controller_idle() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("tournament.csv"), "complete garbage\n1,2\n").unwrap();

    let mut controller = controller_in(&dir);
    controller.load_or_initialize();
    assert!(!controller.is_initialized());
    assert_eq!(controller.status(), "no tournament in progress\n");
}

#[test]
fn auto_init_creates_a_tournament_from_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let mut controller = BracketController::new(
        Configuration::new()
            .with_data_dir(dir.path())
            .with_format("gen2ou")
            .with_best_of(3)
            .with_player_list(vec!["Red", "Blue", "Green", "Gold"])
            .with_auto_init(true),
    );
    controller.load_or_initialize();
    assert!(controller.is_initialized());
    assert!(controller.status().contains("gen2ou tournament (best of 3, 4 players)"));
}

#[test]
fn audit_logger_appends_under_the_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config = Configuration::new().with_data_dir(dir.path());
    // only this test installs the global subscriber; everything logged by the
    // operations below lands in the daily file under <data_dir>/logs
    arena_ladder::init_logger(&config).unwrap();

    let mut controller = BracketController::new(config.clone());
    controller
        .initialize("gen1ou", &players(&["Alice", "Bob"]), 3, false)
        .unwrap();
    controller.record_win("Alice", "Bob");

    let logs: Vec<_> = std::fs::read_dir(config.log_dir())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(logs.len(), 1);
    let name = logs[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("arena-") && name.ends_with(".log"), "{name}");
    let contents = std::fs::read_to_string(&logs[0]).unwrap();
    assert!(contents.contains("audit log opened"));
    assert!(contents.contains("created gen1ou bracket"));
    assert!(contents.contains("alice beats bob"));

    // a second install is rejected, not silently stacked
    assert!(arena_ladder::init_logger(&config).is_err());
}

#[test]
fn reset_clears_memory_and_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut controller = four_player_controller(&dir);
    assert!(dir.path().join("tournament.csv").exists());

    controller.reset().unwrap();
    assert!(!controller.is_initialized());
    assert!(!dir.path().join("tournament.csv").exists());

    // a fresh tournament can be created afterwards
    controller
        .initialize("gen1ou", &players(&["A", "B"]), 5, false)
        .unwrap();
    assert!(controller.is_initialized());

    let mut reloaded = controller_in(&dir);
    reloaded.load_or_initialize();
    assert!(reloaded.is_initialized());
}
