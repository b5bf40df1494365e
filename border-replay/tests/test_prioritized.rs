use anyhow::Result;
use border_replay::{
    ExperienceBufferBase, Min, NstepConfig, PerConfig, PrioritizedReplayBuffer, ReductionTree,
    ReplayBuffer, ReplayBufferBase, ReplayBufferConfig, Sum, TransitionBatch, WeightNormalizer,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tempdir::TempDir;
use test_log::test;

fn transitions(rewards: &[f32], dones: &[i8]) -> TransitionBatch<f32, i64> {
    let n = rewards.len();
    TransitionBatch::new(
        (0..n).map(|i| i as f32).collect(),
        vec![0; n],
        rewards.to_vec(),
        (0..n).map(|i| i as f32 + 1.0).collect(),
        dones.to_vec(),
    )
}

fn per_config(normalize: WeightNormalizer) -> ReplayBufferConfig {
    ReplayBufferConfig::default()
        .capacity(8)
        .seed(1)
        .per_config(Some(
            PerConfig::default()
                .alpha(1.0)
                .eps(1e-6)
                .normalize(normalize),
        ))
}

fn frequencies(ixs: &[usize], n_slots: usize) -> Vec<f32> {
    (0..n_slots)
        .map(|slot| ixs.iter().filter(|&&ix| ix == slot).count() as f32 / ixs.len() as f32)
        .collect()
}

#[test]
fn test_tree_reductions_match_leaves() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(0);
    let mut sum = ReductionTree::new(100, Sum)?;
    let mut min = ReductionTree::new(100, Min)?;
    let values = (0..sum.len())
        .map(|_| rng.gen_range(0.0f64..10.0))
        .collect::<Vec<_>>();
    for (i, &v) in values.iter().enumerate() {
        sum.set(i, v)?;
        min.set(i, v)?;
    }

    let total = values.iter().sum::<f64>();
    assert!((sum.reduce(0, sum.len()) - total).abs() < 1e-9);
    assert!((sum.root() - total).abs() < 1e-9);
    assert_eq!(
        min.reduce(0, min.len()),
        values.iter().cloned().fold(f64::INFINITY, f64::min)
    );
    Ok(())
}

#[test]
fn test_equal_priorities_sample_uniformly() -> Result<()> {
    let mut buffer = PrioritizedReplayBuffer::<f32, i64>::build(&per_config(WeightNormalizer::All))?;
    buffer.push(transitions(&[0.0; 5], &[0; 5]))?;

    let mut ixs = vec![];
    for _ in 0..2000 {
        let batch = buffer.batch(32)?;
        assert!(batch.weight.unwrap().iter().all(|&w| (w - 1.0).abs() < 1e-5));
        ixs.extend(batch.ix_sample.unwrap());
    }
    for f in frequencies(&ixs, 5) {
        assert!((f - 0.2).abs() < 0.01, "{}", f);
    }
    Ok(())
}

#[test]
fn test_sampling_follows_priorities() -> Result<()> {
    let mut buffer = PrioritizedReplayBuffer::<f32, i64>::build(&per_config(WeightNormalizer::All))?;
    let tr = transitions(&[0.0; 4], &[0; 4]);
    buffer.add_with_priorities(tr.view(), &[1.0, 1.0, 2.0, 4.0])?;

    let mut ixs = vec![];
    for _ in 0..2000 {
        ixs.extend(buffer.sample(32, 0.0)?.ix_sample.unwrap());
    }
    let f = frequencies(&ixs, 4);
    for (f, p) in f.iter().zip([0.125, 0.125, 0.25, 0.5].iter()) {
        assert!((f - p).abs() < 0.01, "{} vs {}", f, p);
    }
    assert!((f[3] / f[0] - 4.0).abs() < 0.3);
    Ok(())
}

#[test]
fn test_importance_weights() -> Result<()> {
    // global normalizer: all weights <= 1, the smallest priority gets 1
    let mut buffer = PrioritizedReplayBuffer::<f32, i64>::build(&per_config(WeightNormalizer::All))?;
    let tr = transitions(&[0.0; 4], &[0; 4]);
    buffer.add_with_priorities(tr.view(), &[1.0, 2.0, 3.0, 4.0])?;
    for _ in 0..50 {
        let batch = buffer.sample(8, 0.7)?;
        for (&ix, &w) in batch.ix_sample.unwrap().iter().zip(batch.weight.unwrap().iter()) {
            assert!(w <= 1.0 + 1e-6);
            let expected = (1.0 / (ix as f32 + 1.0)).powf(0.7);
            assert!((w - expected).abs() < 1e-4, "{} vs {}", w, expected);
        }
    }

    // batch normalizer: the largest weight of every batch is 1
    let mut buffer =
        PrioritizedReplayBuffer::<f32, i64>::build(&per_config(WeightNormalizer::Batch))?;
    buffer.add_with_priorities(tr.view(), &[1.0, 2.0, 3.0, 4.0])?;
    for _ in 0..50 {
        let w = buffer.sample(8, 0.7)?.weight.unwrap();
        let w_max = w.iter().cloned().fold(0.0, f32::max);
        assert!((w_max - 1.0).abs() < 1e-6);
    }
    Ok(())
}

#[test]
fn test_training_loop() -> Result<()> {
    let config = per_config(WeightNormalizer::All).per_config(Some(
        PerConfig::default()
            .beta_0(0.4)
            .beta_final(1.0)
            .n_opts_final(10),
    ));
    let mut buffer = PrioritizedReplayBuffer::<f32, i64>::build(&config)?;
    let mut rng = StdRng::seed_from_u64(3);

    for step in 0..30 {
        let n = rng.gen_range(1..4);
        buffer.push(transitions(&vec![step as f32; n], &vec![0; n]))?;
        let batch = buffer.batch(4)?;
        let td_err = (0..4).map(|_| rng.gen_range(-2.0..2.0)).collect::<Vec<f32>>();
        buffer.update_priority(&batch.ix_sample, &Some(td_err))?;
    }
    assert_eq!(buffer.len(), 8);
    assert_eq!(buffer.beta(), 1.0);
    assert!(buffer.max_priority() >= 1.0);
    Ok(())
}

#[test]
fn test_nstep_returns() -> Result<()> {
    let config = ReplayBufferConfig::default()
        .capacity(8)
        .nstep_config(Some(NstepConfig::default().nstep(1).gamma(0.9)));
    let mut buffer = ReplayBuffer::<f32, i64>::build(&config)?;
    buffer.push(transitions(&[1.0, 2.0, 3.0], &[0, 0, 1]))?;
    let batch = buffer.batch(16)?;
    for (k, &ix) in batch.ix_sample.as_ref().unwrap().iter().enumerate() {
        assert_eq!(batch.reward[k], ix as f32 + 1.0);
        assert_eq!(batch.discount.as_ref().unwrap()[k], 0.9);
    }

    let config = config.nstep_config(Some(NstepConfig::default().nstep(3).gamma(0.9)));
    let mut buffer = ReplayBuffer::<f32, i64>::build(&config)?;
    buffer.push(transitions(&[1.0, 2.0, 3.0, 4.0], &[0, 1, 0, 0]))?;
    let batch = buffer.batch(32)?;
    for (k, &ix) in batch.ix_sample.as_ref().unwrap().iter().enumerate() {
        // an episode ends at slot 1, the cursor is at slot 4
        let (ret, discount) = match ix {
            0 => (1.0 + 0.9 * 2.0, 0.81),
            1 => (2.0, 0.9),
            2 => (3.0 + 0.9 * 4.0, 0.81),
            _ => (4.0, 0.9),
        };
        assert!((batch.reward[k] - ret).abs() < 1e-6);
        assert!((batch.discount.as_ref().unwrap()[k] - discount).abs() < 1e-6);
    }
    Ok(())
}

#[test]
fn test_build_from_config_file() -> Result<()> {
    let config = per_config(WeightNormalizer::Batch)
        .obs_dim(1)
        .nstep_config(Some(NstepConfig::default()));
    let dir = TempDir::new("border_replay")?;
    let path = dir.path().join("replay_buffer.yaml");
    config.save(&path)?;

    let config_ = ReplayBufferConfig::load(&path)?;
    assert_eq!(config, config_);
    let mut buffer = PrioritizedReplayBuffer::<f32, i64>::build(&config_)?;
    buffer.push(transitions(&[1.0], &[1]))?;
    assert_eq!(buffer.batch(2)?.len(), 2);
    Ok(())
}
