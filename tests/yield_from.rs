use anyhow::{Result, anyhow};
use datapipe::testing::*;
use datapipe::*;

fn count_up(d: &Data) -> anyhow::Result<DataPipeline> {
    let n = d.as_int().ok_or_else(|| anyhow!("expected an int"))?;
    Ok(read_sequence(ints(0..n)).and_return()?)
}

#[test]
fn yield_from_exhausts_each_nested_pipeline_in_turn() -> Result<()> {
    let mut p = read_sequence(ints([1, 0, 2, 3])).yield_from(count_up).and_return()?;
    assert_eq!(as_ints(&drain(&mut p)?), vec![0, 0, 1, 0, 1, 2]);

    p.reset()?;
    assert_eq!(drain(&mut p)?.len(), 6);
    Ok(())
}

#[test]
fn yield_from_resumes_inside_a_nested_pipeline() -> Result<()> {
    let factory = || {
        read_sequence(ints([2, 3, 0, 4]))
            .yield_from(|d| {
                let outer = d.as_int().unwrap_or(0);
                Ok(read_sequence(ints(0..outer))
                    .map_fn(move |v| Ok(Data::Int(outer * 100 + v.as_int().unwrap_or(0))))
                    .prefetch(2)
                    .and_return()?)
            })
            .and_return()
    };
    for prefix in 0..10 {
        assert_resumes_from_checkpoint(factory, prefix)?;
    }
    Ok(())
}

#[test]
fn yield_function_failure_is_a_record_error() -> Result<()> {
    let mut p = read_sequence(vec![Data::Int(1), Data::from("x")])
        .yield_from(count_up)
        .and_return()?;

    assert_eq!(p.next()?, Some(Data::Int(0)));
    assert_eq!(p.next().unwrap_err().kind(), ErrorKind::Record);
    Ok(())
}
