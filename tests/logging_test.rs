//! Global subscriber installation, in its own test binary.

use flyscan::logging::init_logging;

#[test]
fn test_second_init_is_harmless() {
    init_logging("debug");
    assert!(!init_logging("info"));
}
