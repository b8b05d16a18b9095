use super::*;
use crate::builder::GraphBuilder;
use crate::node::{feed_buffer, FeedBuffer};
use crate::optim::{Optimizer, RmsProp, RmsPropHyperParams};
use approx::assert_relative_eq;

/// Accumulator cell `h_t = h_{t-1} + x_t`, cost = sum(h_t * w) with w = 1.
fn accumulator() -> Result<Graph, NeuroGraphError> {
    let mut b = GraphBuilder::with_seed(9);
    let x = b.feed(&[1, 1])?;
    b.set_flags(x, Flags::INPUT)?;
    let h = b.state(&[1, 1])?;
    let out = b.add(h, x)?;
    b.set_flags(out, Flags::OUTPUT)?;
    b.set_recurrence(h, out)?;
    let w = b.var(&[1], vec![1.0])?;
    let weighted = b.mul(out, w)?;
    let rows = b.reduce_sum(weighted, 1)?;
    let cost = b.reduce_sum(rows, 0)?;
    Graph::new(b, cost, &[])
}

fn ones(n: usize) -> Vec<FeedBuffer> {
    (0..n).map(|_| feed_buffer(vec![1.0])).collect()
}

#[test]
fn test_unroll_rejects_feedforward_and_zero_length() -> Result<(), NeuroGraphError> {
    let mut b = GraphBuilder::with_seed(0);
    let x = b.feed(&[1, 2])?;
    let s = b.reduce_sum(x, 1)?;
    let cost = b.reduce_sum(s, 0)?;
    let mut g = Graph::new(b, cost, &[])?;
    assert!(matches!(
        g.unroll(2),
        Err(NeuroGraphError::UnrollError(UnrollError::NotRecurrent))
    ));

    let mut g = accumulator()?;
    assert!(matches!(
        g.unroll(0),
        Err(NeuroGraphError::UnrollError(UnrollError::InvalidLength(0)))
    ));
    Ok(())
}

#[test]
fn test_unrolled_accumulator_golden_value() -> Result<(), NeuroGraphError> {
    let mut g = accumulator()?;
    let size = g.size_var();
    let mut u = g.unroll(3)?;
    assert_eq!(u.size_var(), size);
    assert_eq!(u.find_all(Flags::INPUT, 0).len(), 3);
    assert_eq!(u.feed_bind(Flags::INPUT, 0, ones(3))?, 3);

    // costs of the three steps are 1, 2 and 3
    assert_relative_eq!(u.cost(0, true)?, 2.0);
    let outputs = u.find_all(Flags::OUTPUT, 0);
    assert_eq!(outputs.len(), 3);
    let last = outputs[outputs.len() - 1];
    assert_relative_eq!(u.value(last)?[0], 3.0);
    // d(mean of h_t * w)/dw = mean of h_t
    assert_relative_eq!(u.grads()[0], 2.0);
    Ok(())
}

#[test]
fn test_unrolled_shares_parameters_and_pools_cost() -> Result<(), NeuroGraphError> {
    let mut g = accumulator()?;
    let base_len = g.nodes().len();
    let u = g.unroll(4)?;
    let vars = u.nodes().iter().filter(|n| n.op == Op::Var).count();
    assert_eq!(vars, 1);
    let costs: Vec<&Node> = u.nodes().iter().filter(|n| n.flags.contains(Flags::COST)).collect();
    assert_eq!(costs.len(), 1);
    assert_eq!(costs[0].op, Op::Avg);
    assert_eq!(costs[0].preds.len(), 4);
    // shared weight, six time-variant nodes per step minus three replaced state leaves, pool
    assert_eq!(u.nodes().len(), 1 + (base_len - 1) * 4 - 3 + 1);
    for (i, node) in u.nodes().iter().enumerate() {
        assert!(node.preds.iter().all(|&p| p < i));
    }
    assert!(!u.is_rnn());
    Ok(())
}

#[test]
fn test_training_unrolled_updates_base_parameters() -> Result<(), NeuroGraphError> {
    let mut g = accumulator()?;
    {
        let mut u = g.unroll(3)?;
        u.feed_bind(Flags::INPUT, 0, ones(3))?;
        u.cost(0, true)?;
        let mut opt = RmsProp::new(RmsPropHyperParams {
            lr: 0.1,
            ..Default::default()
        })?;
        opt.step(&mut u)?;
    }
    assert!(g.params()[0] < 1.0);
    Ok(())
}

#[test]
fn test_streaming_base_graph_carries_state() -> Result<(), NeuroGraphError> {
    let mut g = accumulator()?;
    g.feed_bind(Flags::INPUT, 0, ones(1))?;
    let out = g.find(Flags::OUTPUT, 0)?;
    g.rnn_start();
    for expected in [1.0, 2.0, 3.0] {
        g.eval(Flags::OUTPUT, 0)?;
        assert_relative_eq!(g.value(out)?[0], expected);
    }
    g.rnn_end();
    g.eval(Flags::OUTPUT, 0)?;
    assert_relative_eq!(g.value(out)?[0], 1.0);
    Ok(())
}

#[test]
fn test_streaming_unrolled_graph_carries_last_replica() -> Result<(), NeuroGraphError> {
    let mut g = accumulator()?;
    let mut u = g.unroll(3)?;
    u.feed_bind(Flags::INPUT, 0, ones(3))?;
    let last = *u
        .find_all(Flags::OUTPUT, 0)
        .last()
        .ok_or_else(|| NeuroGraphError::InternalError("no output".to_string()))?;
    u.rnn_start();
    u.eval(Flags::OUTPUT, 0)?;
    assert_relative_eq!(u.value(last)?[0], 3.0);
    u.eval(Flags::OUTPUT, 0)?;
    assert_relative_eq!(u.value(last)?[0], 6.0);
    u.rnn_end();
    u.eval(Flags::OUTPUT, 0)?;
    assert_relative_eq!(u.value(last)?[0], 3.0);
    Ok(())
}

#[test]
fn test_batch_change_resets_state() -> Result<(), NeuroGraphError> {
    let mut g = accumulator()?;
    g.feed_bind(Flags::INPUT, 0, ones(1))?;
    let out = g.find(Flags::OUTPUT, 0)?;
    g.rnn_start();
    g.eval(Flags::OUTPUT, 0)?;
    g.eval(Flags::OUTPUT, 0)?;
    g.set_batch_size(2)?;
    g.feed_bind(Flags::INPUT, 0, vec![feed_buffer(vec![1.0, 1.0])])?;
    g.eval(Flags::OUTPUT, 0)?;
    assert_eq!(g.value(out)?, &[1.0, 1.0]);
    Ok(())
}
