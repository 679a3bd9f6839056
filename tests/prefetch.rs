use anyhow::{Result, anyhow};
use datapipe::testing::*;
use datapipe::*;
use std::time::Duration;

fn slow(millis: u64) -> ElementMapper {
    ElementMapper::new(move |d: Data| {
        std::thread::sleep(Duration::from_millis(millis));
        Ok(d)
    })
}

#[test]
fn prefetch_preserves_upstream_order() -> Result<()> {
    for n in [0, 1, 3, 100] {
        let mut p = read_sequence(ints(0..50)).prefetch(n).and_return()?;
        assert_eq!(as_ints(&drain(&mut p)?), (0..50).collect::<Vec<_>>(), "n={n}");
        assert_eq!(p.next()?, None);
    }
    Ok(())
}

#[test]
fn upstream_error_surfaces_on_consumer_in_order() -> Result<()> {
    let fails_at_five = ElementMapper::new(|d: Data| match d.as_int() {
        Some(5) => Err(anyhow!("bad record")),
        _ => Ok(d),
    });

    let mut p = read_sequence(ints(0..10))
        .map(fails_at_five, 1, false)
        .prefetch(3)
        .and_return()?;

    for expected in 0..5 {
        assert_eq!(p.next()?, Some(Data::Int(expected)));
    }
    assert_eq!(p.next().unwrap_err().kind(), ErrorKind::Record);
    assert!(p.is_broken());
    assert!(matches!(p.next(), Err(Error::Broken)));

    p.reset()?;
    assert_eq!(p.next()?, Some(Data::Int(0)));
    Ok(())
}

#[test]
fn reset_while_worker_is_mid_pull() -> Result<()> {
    let mut p = read_sequence(ints(0..20))
        .map(slow(5), 1, false)
        .prefetch(4)
        .and_return()?;

    for _ in 0..3 {
        p.next()?;
    }
    p.reset()?;
    assert_eq!(as_ints(&drain(&mut p)?), (0..20).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn reset_while_worker_is_blocked_on_a_full_queue() -> Result<()> {
    let mut p = read_sequence(ints(0..100)).prefetch(2).and_return()?;
    p.next()?;
    // Give the worker time to fill the queue and block.
    std::thread::sleep(Duration::from_millis(20));
    p.reset()?;
    assert_eq!(drain(&mut p)?.len(), 100);
    Ok(())
}

#[test]
fn dropping_a_pipeline_with_a_blocked_worker_returns() -> Result<()> {
    let mut p = read_sequence(ints(0..1000)).prefetch(1).and_return()?;
    p.next()?;
    std::thread::sleep(Duration::from_millis(10));
    drop(p);
    Ok(())
}

#[test]
fn prefetch_resumes_from_checkpoint() -> Result<()> {
    let factory = || {
        read_sequence(ints(0..25))
            .map(slow(1), 2, false)
            .prefetch(4)
            .bucket(2, false)
            .and_return()
    };
    for prefix in [0, 1, 2, 6, 12, 13] {
        assert_resumes_from_checkpoint(factory, prefix)?;
    }
    Ok(())
}

#[test]
fn checkpoint_after_exhaustion_stays_exhausted() -> Result<()> {
    let build = || read_sequence(ints(0..3)).prefetch(8).and_return();

    let mut p = build()?;
    for _ in 0..3 {
        p.next()?;
    }
    // The worker has likely seen the end already; that must be carried over.
    std::thread::sleep(Duration::from_millis(10));
    let state = p.state_dict()?;

    let mut resumed = build()?;
    resumed.load_state_dict(&state, true)?;
    assert_eq!(resumed.next()?, None);
    assert_eq!(p.next()?, None);
    Ok(())
}

#[test]
fn nested_prefetch_stages() -> Result<()> {
    let mut p = read_sequence(ints(0..40))
        .prefetch(3)
        .map(ElementMapper::new(Ok), 4, false)
        .prefetch(5)
        .and_return()?;
    assert_eq!(as_ints(&drain(&mut p)?), (0..40).collect::<Vec<_>>());

    p.reset()?;
    assert_eq!(drain(&mut p)?.len(), 40);
    Ok(())
}

#[test]
fn checkpoint_with_a_queued_failure_keeps_the_pipeline_usable() -> Result<()> {
    let fails_at_three = ElementMapper::new(|d: Data| match d.as_int() {
        Some(3) => Err(anyhow!("bad record")),
        _ => Ok(d),
    });
    let build = || {
        read_sequence(ints(0..6))
            .map(fails_at_three.clone(), 1, false)
            .prefetch(8)
            .and_return()
    };

    let mut p = build()?;
    assert_eq!(p.next()?, Some(Data::Int(0)));
    // Let the worker run into the failure before the checkpoint is taken.
    std::thread::sleep(Duration::from_millis(50));
    let state = p.state_dict()?;
    assert!(!p.is_broken());

    let mut resumed = build()?;
    resumed.load_state_dict(&state, true)?;

    for pipeline in [&mut p, &mut resumed] {
        assert_eq!(pipeline.next()?, Some(Data::Int(1)));
        assert_eq!(pipeline.next()?, Some(Data::Int(2)));
        assert_eq!(pipeline.next().unwrap_err().kind(), ErrorKind::Record);
        assert!(pipeline.is_broken());
    }
    Ok(())
}

#[test]
fn prefetch_reset_repeats() -> Result<()> {
    let mut p = read_sequence(ints(0..30)).prefetch(4).and_return()?;
    Ok(assert_reset_repeats(&mut p, 7)?)
}
