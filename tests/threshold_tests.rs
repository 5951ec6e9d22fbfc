use pbft_core::utils::{fault_tolerance, quorum_threshold};

#[test]
fn test_fault_tolerance_per_cluster_size() {
    // n = 3f + 1 is the smallest cluster tolerating f faults
    assert_eq!(fault_tolerance(1), 0);
    assert_eq!(fault_tolerance(2), 0);
    assert_eq!(fault_tolerance(3), 0);
    assert_eq!(fault_tolerance(4), 1);
    assert_eq!(fault_tolerance(6), 1);
    assert_eq!(fault_tolerance(7), 2);
    assert_eq!(fault_tolerance(10), 3);
    assert_eq!(fault_tolerance(100), 33);
}

#[test]
fn test_quorum_threshold_is_two_f_plus_one() {
    assert_eq!(quorum_threshold(3), 1);
    assert_eq!(quorum_threshold(4), 3);
    assert_eq!(quorum_threshold(7), 5);

    for n in 1..=64 {
        let f = (n - 1) / 3;
        assert_eq!(fault_tolerance(n), f, "n = {n}");
        assert_eq!(quorum_threshold(n), 2 * f + 1, "n = {n}");
    }
}

#[test]
fn test_empty_cluster_does_not_underflow() {
    assert_eq!(fault_tolerance(0), 0);
    assert_eq!(quorum_threshold(0), 1);
}
