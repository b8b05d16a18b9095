use super::*;
use crate::node::feed_buffer;
use crate::utils::testing::check_slice_near;
use approx::assert_relative_eq;

/// y = x * w + b (elementwise), cost = mse(y, t); x, t of shape [batch, 2].
fn linear_mse(batch: usize) -> Result<Graph, NeuroGraphError> {
    let mut b = GraphBuilder::with_seed(1);
    let x = b.feed(&[batch, 2])?;
    b.set_flags(x, Flags::INPUT)?;
    let w = b.var(&[2], vec![2.0, 3.0])?;
    let bias = b.var(&[2], vec![0.5, -0.5])?;
    let xw = b.mul(x, w)?;
    let y = b.add(xw, bias)?;
    b.set_flags(y, Flags::OUTPUT)?;
    let t = b.feed(&[batch, 2])?;
    b.set_flags(t, Flags::TRUTH)?;
    let cost = b.mse(y, t)?;
    Graph::new(b, cost, &[])
}

#[test]
fn test_new_lays_out_stores_in_topological_order() -> Result<(), NeuroGraphError> {
    let g = linear_mse(1)?;
    assert_eq!(g.size_var(), 4);
    assert_eq!(g.size_const(), 0);
    assert_eq!(g.grads().len(), 4);
    assert_eq!(g.batch_size(), 1);
    for (i, node) in g.nodes().iter().enumerate() {
        assert!(node.preds.iter().all(|&p| p < i), "node {} breaks the order", i);
    }
    let mut params = g.params().to_vec();
    params.sort_by(|a, b| a.total_cmp(b));
    assert_eq!(params, vec![-0.5, 0.5, 2.0, 3.0]);
    let cost = g.nodes().iter().position(|n| n.flags.contains(Flags::COST));
    assert_eq!(cost, Some(g.nodes().len() - 1));
    Ok(())
}

#[test]
fn test_new_drops_unreachable_nodes() -> Result<(), NeuroGraphError> {
    let mut b = GraphBuilder::with_seed(1);
    let x = b.feed(&[1, 2])?;
    let unused = b.var(&[3], vec![1.0; 3])?;
    let _dangling = b.sigm(unused)?;
    let s = b.reduce_sum(x, 1)?;
    let cost = b.reduce_sum(s, 0)?;
    let g = Graph::new(b, cost, &[])?;
    assert_eq!(g.nodes().len(), 3);
    assert_eq!(g.size_var(), 0);
    Ok(())
}

#[test]
fn test_new_rejects_invalid_cost() -> Result<(), NeuroGraphError> {
    let mut b = GraphBuilder::with_seed(1);
    let x = b.feed(&[1, 2])?;
    let y = b.sigm(x)?;
    assert!(matches!(Graph::new(b, y, &[]), Err(NeuroGraphError::ValidationError(_))));

    let mut b = GraphBuilder::with_seed(1);
    let c = b.constant(&[], vec![1.0])?;
    assert!(matches!(Graph::new(b, c, &[]), Err(NeuroGraphError::ValidationError(_))));

    let b = GraphBuilder::with_seed(1);
    assert!(matches!(
        Graph::new(b, NodeId(0), &[]),
        Err(NeuroGraphError::InvalidNode { .. })
    ));
    Ok(())
}

#[test]
fn test_new_rejects_unwired_state() -> Result<(), NeuroGraphError> {
    let mut b = GraphBuilder::with_seed(1);
    let h = b.state(&[1, 2])?;
    let s = b.reduce_sum(h, 1)?;
    let cost = b.reduce_sum(s, 0)?;
    assert!(matches!(Graph::new(b, cost, &[]), Err(NeuroGraphError::ValidationError(_))));
    Ok(())
}

#[test]
fn test_cost_and_gradients() -> Result<(), NeuroGraphError> {
    let mut g = linear_mse(1)?;
    g.feed_bind(Flags::INPUT, 0, vec![feed_buffer(vec![1.0, 1.0])])?;
    g.feed_bind(Flags::TRUTH, 0, vec![feed_buffer(vec![2.5, 2.5])])?;
    // y = (2.5, 2.5)
    assert_relative_eq!(g.cost(0, true)?, 0.0);
    assert!(g.grads().iter().all(|&v| v == 0.0));

    g.feed_bind(Flags::TRUTH, 0, vec![feed_buffer(vec![0.5, 4.5])])?;
    // residuals (2, -2): cost = 8 / 2
    assert_relative_eq!(g.cost(0, true)?, 4.0);
    let mut grads = g.grads().to_vec();
    grads.sort_by(|a, b| a.total_cmp(b));
    // dcost/dy = (2, -2); same for w (x = 1) and b
    check_slice_near(&grads, &[-2.0, -2.0, 2.0, 2.0], 1e-6);

    // without gradients the store is left alone
    g.feed_bind(Flags::TRUTH, 0, vec![feed_buffer(vec![2.5, 2.5])])?;
    assert_relative_eq!(g.cost(0, false)?, 0.0);
    assert_eq!(g.grads().iter().filter(|v| v.abs() == 2.0).count(), 4);
    Ok(())
}

#[test]
fn test_cost_label_not_found() -> Result<(), NeuroGraphError> {
    let mut g = linear_mse(1)?;
    assert!(matches!(
        g.cost(7, false),
        Err(NeuroGraphError::NodeNotFound { label: 7, .. })
    ));
    Ok(())
}

#[test]
fn test_unbound_and_undersized_feeds() -> Result<(), NeuroGraphError> {
    let mut g = linear_mse(2)?;
    assert!(matches!(g.cost(0, false), Err(NeuroGraphError::UnboundFeed { .. })));
    g.feed_bind(Flags::INPUT, 0, vec![feed_buffer(vec![1.0; 4])])?;
    g.feed_bind(Flags::TRUTH, 0, vec![feed_buffer(vec![1.0; 3])])?;
    assert!(matches!(
        g.cost(0, false),
        Err(NeuroGraphError::FeedSizeMismatch { expected: 4, actual: 3, .. })
    ));
    Ok(())
}

#[test]
fn test_set_batch_size_resizes() -> Result<(), NeuroGraphError> {
    let mut g = linear_mse(1)?;
    assert!(matches!(g.set_batch_size(0), Err(NeuroGraphError::ConfigurationError(_))));
    g.set_batch_size(3)?;
    assert_eq!(g.batch_size(), 3);
    let out = g.find(Flags::OUTPUT, 0)?;
    assert_eq!(g.nodes()[out].shape, vec![3, 2]);
    assert_eq!(g.feed_dim(Flags::INPUT, 0)?, 2);
    assert_eq!(g.size_var(), 4);

    g.feed_bind(Flags::INPUT, 0, vec![feed_buffer(vec![1.0; 6])])?;
    g.feed_bind(Flags::TRUTH, 0, vec![feed_buffer(vec![2.5; 6])])?;
    assert_relative_eq!(g.cost(0, false)?, 0.0);
    Ok(())
}

#[test]
fn test_eval_counts_matches() -> Result<(), NeuroGraphError> {
    let mut g = linear_mse(1)?;
    g.feed_bind(Flags::INPUT, 0, vec![feed_buffer(vec![1.0, 2.0])])?;
    assert_eq!(g.eval(Flags::OUTPUT, 0)?, 1);
    let out = g.find(Flags::OUTPUT, 0)?;
    check_slice_near(g.value(out)?, &[2.5, 5.5], 1e-6);
    assert!(matches!(g.eval(Flags::OUTPUT, 1), Err(NeuroGraphError::NodeNotFound { .. })));
    Ok(())
}

#[test]
fn test_apply1_binds_a_copy() -> Result<(), NeuroGraphError> {
    let mut g = linear_mse(4)?;
    let y = g.apply1(&[1.0, -1.0])?.to_vec();
    check_slice_near(&y, &[2.5, -3.5], 1e-6);
    assert_eq!(g.batch_size(), 1);
    Ok(())
}

#[test]
fn test_value_of_feed_is_unsupported() -> Result<(), NeuroGraphError> {
    let g = linear_mse(1)?;
    let x = g.find(Flags::INPUT, 0)?;
    assert!(matches!(g.value(x), Err(NeuroGraphError::UnsupportedOperation(_))));
    assert!(matches!(g.value(99), Err(NeuroGraphError::InvalidNode { index: 99, .. })));
    Ok(())
}

#[test]
fn test_multiple_cost_matches_use_first() -> Result<(), NeuroGraphError> {
    let mut b = GraphBuilder::with_seed(1);
    let w = b.var(&[2], vec![1.0, 2.0])?;
    let sum = b.reduce_sum(w, 0)?;
    let sq = b.square(w)?;
    let sq_sum = b.reduce_sum(sq, 0)?;
    b.set_flags(sum, Flags::COST)?;
    let mut g = Graph::new(b, sq_sum, &[sum])?;
    // the primary cost is ordered before the extra root
    let first = g
        .nodes()
        .iter()
        .position(|n| n.flags.contains(Flags::COST))
        .ok_or_else(|| NeuroGraphError::InternalError("no cost".to_string()))?;
    assert_eq!(g.nodes()[g.nodes()[first].preds[0]].op, Op::Square);
    let expected = 5.0;
    assert_relative_eq!(g.cost(0, false)?, expected);
    Ok(())
}

#[test]
fn test_mode_and_streaming_flags() -> Result<(), NeuroGraphError> {
    let mut g = linear_mse(1)?;
    assert!(!g.is_train());
    g.switch_mode(true);
    assert!(g.is_train());
    g.rnn_start();
    assert!(g.network().is_streaming());
    g.rnn_end();
    assert!(!g.network().is_streaming());
    assert!(!g.is_rnn());
    Ok(())
}

#[test]
fn test_graph_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<Graph>();
}

#[test]
fn test_failed_batch_resize_leaves_graph_usable() -> Result<(), NeuroGraphError> {
    // the constant does not follow the batch, so concat only works at batch 1
    let mut b = GraphBuilder::with_seed(1);
    let x = b.feed(&[1, 2])?;
    b.set_flags(x, Flags::INPUT)?;
    let c = b.constant(&[1, 2], vec![3.0, 4.0])?;
    let joined = b.concat(&[x, c], 1)?;
    let rows = b.reduce_sum(joined, 1)?;
    let cost = b.reduce_sum(rows, 0)?;
    let mut g = Graph::new(b, cost, &[])?;
    let shapes: Vec<Vec<usize>> = g.nodes().iter().map(|n| n.shape.clone()).collect();

    assert!(matches!(g.set_batch_size(2), Err(NeuroGraphError::ShapeMismatch { .. })));
    assert_eq!(g.batch_size(), 1);
    let after: Vec<Vec<usize>> = g.nodes().iter().map(|n| n.shape.clone()).collect();
    assert_eq!(after, shapes);

    g.set_batch_size(1)?;
    g.feed_bind(Flags::INPUT, 0, vec![feed_buffer(vec![1.0, 2.0])])?;
    assert_relative_eq!(g.cost(0, false)?, 10.0);
    Ok(())
}
