//! Tests for in-memory state dicts and the checkpoint module.

use anyhow::Result;
use datapipe::testing::*;
use datapipe::*;

fn training_pipeline() -> datapipe::Result<DataPipeline> {
    read_sequence(ints(0..40))
        .shuffle_with_seed(6, 2024, true, true)
        .map(ElementMapper::new(|d: Data| Ok(Data::Int(d.as_int().unwrap_or(0) * 2))), 3, false)
        .filter(|d| Ok(d.as_int().unwrap_or(0) % 3 != 0))
        .bucket_by_length(
            vec![(20, 2), (80, 3)],
            LengthExtractor::from_selector(None)?,
            false,
            false,
        )
        .prefetch(2)
        .and_return()
}

#[test]
fn composed_pipeline_resumes_at_every_prefix() -> Result<()> {
    let total = drain(&mut training_pipeline()?)?.len();
    for prefix in 0..=total {
        assert_resumes_from_checkpoint(training_pipeline, prefix)?;
    }
    Ok(())
}

#[test]
fn state_dict_can_be_reloaded_into_the_same_pipeline() -> Result<()> {
    let mut p = training_pipeline()?;
    p.next()?;
    let state = p.state_dict()?;
    let rest = drain(&mut p)?;

    p.load_state_dict(&state, true)?;
    assert_records_equal(&drain(&mut p)?, &rest);
    Ok(())
}

#[test]
fn state_dict_survives_a_json_round_trip() -> Result<()> {
    let mut p = training_pipeline()?;
    p.next()?;
    p.next()?;
    let state = p.state_dict()?;

    let json = serde_json::to_string(&state)?;
    let restored: StateDict = serde_json::from_str(&json)?;

    let mut resumed = training_pipeline()?;
    resumed.load_state_dict(&restored, true)?;
    assert_records_equal(&drain(&mut resumed)?, &drain(&mut p)?);
    Ok(())
}

#[cfg(feature = "checkpointing")]
mod checkpoint_tests {
    use super::*;
    use datapipe::checkpoint::{CheckpointConfig, CheckpointManager, compute_checksum};
    use std::fs;
    use tempfile::TempDir;

    fn manager(tmp: &TempDir, max_checkpoints: Option<usize>) -> CheckpointManager {
        CheckpointManager::new(CheckpointConfig {
            enabled: true,
            directory: tmp.path().join("ckpt"),
            auto_recover: true,
            max_checkpoints,
        })
        .unwrap()
    }

    #[test]
    fn test_checkpoint_config_default() {
        let config = CheckpointConfig::default();
        assert!(!config.enabled);
        assert!(config.auto_recover);
        assert_eq!(config.max_checkpoints, Some(10));
    }

    #[test]
    fn test_manager_creates_directory() {
        let tmp = TempDir::new().unwrap();
        let _manager = manager(&tmp, None);
        assert!(tmp.path().join("ckpt").is_dir());
    }

    #[test]
    fn test_save_and_load_round_trip() -> Result<()> {
        let tmp = TempDir::new()?;
        let manager = manager(&tmp, None);

        let mut p = training_pipeline()?;
        p.next()?;
        let state = p.state_dict()?;

        let path = manager.save("train", 1, &state)?;
        let loaded = manager.load(&path)?;
        assert_eq!(loaded.pipeline_id, "train");
        assert_eq!(loaded.step, 1);
        assert_eq!(loaded.state, state);
        Ok(())
    }

    #[test]
    fn test_find_latest_uses_highest_step() -> Result<()> {
        let tmp = TempDir::new()?;
        let manager = manager(&tmp, None);
        let state = read_sequence(ints(0..3)).and_return()?.state_dict()?;

        assert!(manager.find_latest("train")?.is_none());
        for step in [5, 100, 20] {
            manager.save("train", step, &state)?;
        }
        manager.save("eval", 500, &state)?;

        let latest = manager.find_latest("train")?.unwrap();
        assert_eq!(manager.load(&latest)?.step, 100);
        Ok(())
    }

    #[test]
    fn test_retention_keeps_newest() -> Result<()> {
        let tmp = TempDir::new()?;
        let manager = manager(&tmp, Some(2));
        let state = read_sequence(ints(0..3)).and_return()?.state_dict()?;

        for step in 1..=5 {
            manager.save("train", step, &state)?;
        }

        let mut names: Vec<String> = fs::read_dir(tmp.path().join("ckpt"))?
            .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<_>>()?;
        names.sort();
        assert_eq!(names, vec!["checkpoint_train_4.bin", "checkpoint_train_5.bin"]);
        Ok(())
    }

    #[test]
    fn test_tampered_checkpoint_fails_verification() -> Result<()> {
        let tmp = TempDir::new()?;
        let manager = manager(&tmp, None);

        let mut p = read_sequence(ints(0..100)).skip(3).and_return()?;
        p.next()?;
        let path = manager.save("train", 7, &p.state_dict()?)?;

        let mut bytes = fs::read(&path)?;
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        fs::write(&path, bytes)?;

        assert!(manager.load(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_restore_latest_resumes_pipeline() -> Result<()> {
        let tmp = TempDir::new()?;
        let manager = manager(&tmp, Some(3));

        let mut fresh = training_pipeline()?;
        assert_eq!(manager.restore_latest("train", &mut fresh)?, None);

        let mut original = training_pipeline()?;
        for step in 1..=3 {
            original.next()?;
            manager.save("train", step, &original.state_dict()?)?;
        }
        let expected = drain(&mut original)?;

        let mut resumed = training_pipeline()?;
        assert_eq!(manager.restore_latest("train", &mut resumed)?, Some(3));
        assert_records_equal(&drain(&mut resumed)?, &expected);
        Ok(())
    }

    #[test]
    fn test_restore_latest_respects_auto_recover() -> Result<()> {
        let tmp = TempDir::new()?;
        let manager = CheckpointManager::new(CheckpointConfig {
            enabled: true,
            directory: tmp.path().to_path_buf(),
            auto_recover: false,
            max_checkpoints: None,
        })?;

        let mut p = read_sequence(ints(0..3)).and_return()?;
        p.next()?;
        manager.save("train", 1, &p.state_dict()?)?;

        let mut resumed = read_sequence(ints(0..3)).and_return()?;
        assert_eq!(manager.restore_latest("train", &mut resumed)?, None);
        assert_eq!(resumed.next()?, Some(Data::Int(0)));
        Ok(())
    }

    #[test]
    fn test_disabled_manager_refuses_to_save() -> Result<()> {
        let tmp = TempDir::new()?;
        let manager = CheckpointManager::new(CheckpointConfig {
            directory: tmp.path().join("never"),
            ..CheckpointConfig::default()
        })?;

        let state = read_sequence(ints(0..3)).and_return()?.state_dict()?;
        assert!(manager.save("train", 1, &state).is_err());
        assert!(!tmp.path().join("never").exists());
        assert!(manager.find_latest("train")?.is_none());
        Ok(())
    }

    #[test]
    fn test_clear_removes_only_the_named_pipeline() -> Result<()> {
        let tmp = TempDir::new()?;
        let manager = manager(&tmp, None);
        let state = read_sequence(ints(0..3)).and_return()?.state_dict()?;

        manager.save("train", 1, &state)?;
        manager.save("train", 2, &state)?;
        manager.save("eval", 1, &state)?;

        manager.clear("train")?;
        assert!(manager.find_latest("train")?.is_none());
        assert!(manager.find_latest("eval")?.is_some());
        Ok(())
    }

    #[test]
    fn test_compute_checksum_is_stable() {
        assert_eq!(compute_checksum(b"datapipe"), compute_checksum(b"datapipe"));
        assert_ne!(compute_checksum(b"a"), compute_checksum(b"b"));
        assert_eq!(compute_checksum(b"").len(), 64);
    }
}
