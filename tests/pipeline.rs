use anyhow::Result;
use datapipe::testing::*;
use datapipe::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn failing_at(limit: i64, calls: Arc<AtomicUsize>) -> ElementMapper {
    ElementMapper::new(move |d: Data| {
        calls.fetch_add(1, Ordering::SeqCst);
        match d.as_int() {
            Some(v) if v == limit => Err(anyhow::anyhow!("cannot map {v}")),
            _ => Ok(d),
        }
    })
}

#[test]
fn exhaustion_is_sticky_until_reset() -> Result<()> {
    let mut p = read_sequence(ints(0..3)).and_return()?;

    assert_eq!(as_ints(&drain(&mut p)?), vec![0, 1, 2]);
    assert_eq!(p.status(), PipelineStatus::Exhausted);
    assert_eq!(p.next()?, None);
    assert_eq!(p.next()?, None);

    p.reset()?;
    assert_eq!(p.status(), PipelineStatus::Active);
    assert_eq!(as_ints(&drain(&mut p)?), vec![0, 1, 2]);
    Ok(())
}

#[test]
fn error_breaks_pipeline_without_calling_user_code_again() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut p = read_sequence(ints(0..5))
        .map(failing_at(2, Arc::clone(&calls)), 1, false)
        .and_return()?;

    assert_eq!(p.next()?, Some(Data::Int(0)));
    assert_eq!(p.next()?, Some(Data::Int(1)));

    let err = p.next().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Record);
    assert!(p.is_broken());

    let seen = calls.load(Ordering::SeqCst);
    for _ in 0..3 {
        let err = p.next().unwrap_err();
        assert!(matches!(err, Error::Broken));
        assert_eq!(err.kind(), ErrorKind::Pipeline);
    }
    assert_eq!(calls.load(Ordering::SeqCst), seen);

    p.reset()?;
    assert!(!p.is_broken());
    assert_eq!(p.next()?, Some(Data::Int(0)));
    Ok(())
}

#[test]
fn iterator_yields_error_once_then_ends() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut p = read_sequence(ints(0..5))
        .map(failing_at(1, calls), 1, false)
        .and_return()?;

    let items: Vec<_> = p.iter().collect();
    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert!(items[1].is_err());
    Ok(())
}

#[test]
fn builder_reports_first_invalid_argument() {
    let cases = vec![
        read_sequence(ints(0..3)).bucket(0, false),
        read_sequence(ints(0..3)).shard(3, 2),
        read_sequence(ints(0..3)).shard(0, 0),
        read_sequence(ints(0..3)).map(ElementMapper::new(Ok), 0, false),
        read_sequence(ints(0..3))
            .bucket(0, false)
            .bucket(2, false)
            .prefetch(4),
    ];

    for builder in cases {
        let err = builder.and_return().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{err}");
    }
}

#[test]
fn state_dict_uses_position_key() -> Result<()> {
    let mut p = read_sequence(ints(0..5)).skip(1).and_return()?;
    p.next()?;

    let state = p.state_dict()?;
    assert_eq!(state.len(), 1);
    assert!(matches!(state.get(POSITION_KEY), Some(Data::List(_))));
    Ok(())
}

#[test]
fn load_state_dict_validates_before_touching_pipeline() -> Result<()> {
    let mut p = read_sequence(ints(0..5)).and_return()?;
    p.next()?;

    let empty = StateDict::new();
    p.load_state_dict(&empty, false)?;
    let err = p.load_state_dict(&empty, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let mut garbage = StateDict::new();
    garbage.insert(POSITION_KEY.to_string(), Data::Int(3));
    let err = p.load_state_dict(&garbage, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    // Untouched: still positioned after the first record.
    assert!(!p.is_broken());
    assert_eq!(p.next()?, Some(Data::Int(1)));
    Ok(())
}

#[test]
fn mismatched_tape_breaks_pipeline() -> Result<()> {
    let mut source = read_sequence(ints(0..5)).skip(2).and_return()?;
    source.next()?;
    let state = source.state_dict()?;

    // Reads one value of a two-value tape.
    let mut target = read_sequence(ints(0..5)).and_return()?;
    let err = target.load_state_dict(&state, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Pipeline);
    assert!(target.is_broken());

    // Wrong shape where a counter is expected.
    let mut shaped = StateDict::new();
    shaped.insert(
        POSITION_KEY.to_string(),
        Data::List(vec![Data::from("nope")]),
    );
    let mut target = read_sequence(ints(0..5)).and_return()?;
    let err = target.load_state_dict(&shaped, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Pipeline);
    assert!(target.is_broken());
    Ok(())
}

#[test]
fn broken_pipeline_cannot_record_position() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut p = read_sequence(ints(0..5))
        .map(failing_at(0, calls), 1, false)
        .and_return()?;

    assert!(p.next().is_err());
    assert!(matches!(p.state_dict(), Err(Error::Broken)));
    Ok(())
}

#[test]
fn reload_restores_an_exhausted_pipeline_to_active() -> Result<()> {
    let mut p = read_sequence(ints(0..4)).and_return()?;
    p.next()?;
    let state = p.state_dict()?;

    drain(&mut p)?;
    assert_eq!(p.status(), PipelineStatus::Exhausted);

    p.load_state_dict(&state, true)?;
    assert_eq!(as_ints(&drain(&mut p)?), vec![1, 2, 3]);
    Ok(())
}

#[test]
fn custom_sources_compose_with_operators() -> Result<()> {
    struct Countdown {
        start: i64,
        current: i64,
    }

    impl DataSource for Countdown {
        fn next(&mut self) -> datapipe::Result<Option<Data>> {
            if self.current == 0 {
                return Ok(None);
            }
            self.current -= 1;
            Ok(Some(Data::Int(self.current)))
        }

        fn reset(&mut self) -> datapipe::Result<()> {
            self.current = self.start;
            Ok(())
        }

        fn record_position(&mut self, tape: &mut Tape) -> datapipe::Result<()> {
            tape.record(&self.current);
            Ok(())
        }

        fn reload_position(&mut self, tape: &mut Tape) -> datapipe::Result<()> {
            self.current = tape.read()?;
            Ok(())
        }
    }

    let factory = || {
        DataPipelineBuilder::from_source(Box::new(Countdown {
            start: 6,
            current: 6,
        }))
        .bucket(2, false)
        .and_return()
    };

    let mut p = factory()?;
    let batches = drain(&mut p)?;
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0], Data::List(ints([5, 4])));

    for prefix in 0..4 {
        assert_resumes_from_checkpoint(factory, prefix)?;
    }
    Ok(())
}
