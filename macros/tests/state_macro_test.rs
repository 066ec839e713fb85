//! Tests for #[derive(State)] macro

use komiut_core::version::Version;
use komiut_macros::State;

#[derive(State, Clone, Debug, Default)]
struct StageState {
    pub vehicles: Vec<String>,
    #[version]
    pub version: Version,
}

#[derive(State, Clone, Debug)]
struct UnversionedState {
    pub count: i32,
}

#[test]
fn test_version_starts_at_initial() {
    let state = StageState::default();
    assert_eq!(state.version(), Version::INITIAL);
}

#[test]
fn test_bump_version() {
    let mut state = StageState {
        vehicles: vec!["KCA-001".to_string()],
        version: Version::new(5),
    };

    state.bump_version();
    assert_eq!(state.version(), Version::new(6));

    state.bump_version();
    assert_eq!(state.version().value(), 7);
}

#[test]
fn test_state_without_version() {
    // Compiles without generating version accessors
    let state = UnversionedState { count: 3 };
    assert_eq!(state.count, 3);
}
