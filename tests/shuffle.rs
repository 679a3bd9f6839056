use anyhow::Result;
use datapipe::testing::*;
use datapipe::*;

fn sorted(records: &[Data]) -> Vec<i64> {
    let mut values = as_ints(records);
    values.sort_unstable();
    values
}

#[test]
fn shuffle_is_a_permutation_for_any_window() -> Result<()> {
    for window in [0, 1, 2, 5, 50, 1000] {
        let mut p = read_sequence(ints(0..50))
            .shuffle_with_seed(window, 17, true, true)
            .and_return()?;
        assert_eq!(sorted(&drain(&mut p)?), (0..50).collect::<Vec<_>>(), "window={window}");
    }
    Ok(())
}

#[test]
fn shuffle_actually_reorders() -> Result<()> {
    let mut p = read_sequence(ints(0..100))
        .shuffle_with_seed(0, 3, true, true)
        .and_return()?;
    assert_ne!(as_ints(&drain(&mut p)?), (0..100).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn window_of_one_keeps_order() -> Result<()> {
    let mut p = read_sequence(ints(0..20))
        .shuffle_with_seed(1, 99, true, true)
        .and_return()?;
    assert_eq!(as_ints(&drain(&mut p)?), (0..20).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn disabled_shuffle_passes_through() -> Result<()> {
    let mut p = read_sequence(ints(0..20)).shuffle(0, true, false).and_return()?;
    assert_eq!(as_ints(&drain(&mut p)?), (0..20).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn same_seed_same_order_and_reset_replays() -> Result<()> {
    let build = || {
        read_sequence(ints(0..64))
            .shuffle_with_seed(8, 42, false, true)
            .and_return()
    };

    let mut a = build()?;
    let mut b = build()?;
    let first = drain(&mut a)?;
    assert_records_equal(&drain(&mut b)?, &first);

    a.reset()?;
    assert_records_equal(&drain(&mut a)?, &first);
    Ok(())
}

#[test]
fn strict_shuffle_resumes_exactly() -> Result<()> {
    let factory = || {
        read_sequence(ints(0..30))
            .shuffle_with_seed(7, 5, true, true)
            .and_return()
    };
    for prefix in [0, 1, 6, 7, 8, 22, 23, 29, 30] {
        assert_resumes_from_checkpoint(factory, prefix)?;
    }

    let full_window = || {
        read_sequence(ints(0..12))
            .shuffle_with_seed(0, 5, true, true)
            .and_return()
    };
    for prefix in [0, 3, 11] {
        assert_resumes_from_checkpoint(full_window, prefix)?;
    }
    Ok(())
}

#[test]
fn non_strict_shuffle_resumes_after_the_buffered_records() -> Result<()> {
    let build = || {
        read_sequence(ints(0..20))
            .shuffle_with_seed(5, 11, false, true)
            .and_return()
    };

    let mut original = build()?;
    for _ in 0..3 {
        original.next()?;
    }
    let state = original.state_dict()?;

    // Upstream had read the 5 buffered records plus one per pull; the
    // buffer itself is not part of the checkpoint.
    let mut resumed = build()?;
    resumed.load_state_dict(&state, true)?;
    assert_eq!(sorted(&drain(&mut resumed)?), (8..20).collect::<Vec<_>>());
    Ok(())
}
