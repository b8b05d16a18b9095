use super::grad_check::{check_grad, GradCheckError};
use crate::builder::GraphBuilder;
use crate::error::NeuroGraphError;
use crate::graph::{Graph, Model};
use crate::node::{feed_buffer, Flags};
use crate::utils::testing::check_slice_near;
use approx::assert_relative_eq;

fn bind(g: &mut Graph, flag: Flags, data: Vec<f32>) -> Result<(), NeuroGraphError> {
    g.feed_bind(flag, 0, vec![feed_buffer(data)])?;
    Ok(())
}

/// Two-layer classifier touching most operator kinds.
fn classifier() -> Result<Graph, NeuroGraphError> {
    let mut b = GraphBuilder::with_seed(17);
    let x = b.feed(&[2, 3])?;
    b.set_flags(x, Flags::INPUT)?;
    let w1 = b.var(&[4, 3], vec![0.1, -0.2, 0.3, 0.4, 0.5, -0.6, -0.7, 0.8, 0.9, 0.2, 0.1, -0.3])?;
    let b1 = b.var(&[4], vec![0.05, -0.05, 0.1, 0.0])?;
    let h = b.cmul(x, w1)?;
    let h = b.add(h, b1)?;
    let h = b.tanh(h)?;
    let left = b.slice(h, 1, 0, 2)?;
    let right = b.slice(h, 1, 2, 4)?;
    let gated = b.sigm(right)?;
    let mixed = b.mul(left, gated)?;
    let both = b.concat(&[mixed, left], 1)?;
    let flat = b.reshape(both, &[0, 4])?;
    let w2 = b.var(&[4, 3], vec![0.3, 0.1, -0.2, 0.4, -0.5, 0.6, 0.2, 0.2, -0.1, 0.7, -0.3, 0.05])?;
    let logits = b.matmul(flat, w2)?;
    let out = b.softmax(logits)?;
    b.set_flags(out, Flags::OUTPUT)?;
    let t = b.feed(&[2, 3])?;
    b.set_flags(t, Flags::TRUTH)?;
    let ce = b.ce_multi(out, t)?;
    let sq = b.square(w2)?;
    let reg = b.reduce_mean(sq, 0)?;
    let reg = b.reduce_mean(reg, 0)?;
    let cost = b.add(ce, reg)?;
    let mut g = Graph::new(b, cost, &[])?;
    bind(&mut g, Flags::INPUT, vec![0.5, -1.0, 2.0, 1.5, 0.3, -0.7])?;
    bind(&mut g, Flags::TRUTH, vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0])?;
    Ok(g)
}

#[test]
fn test_grad_check_classifier() -> Result<(), GradCheckError> {
    let mut g = classifier()?;
    let summary = check_grad(&mut g, 0, 1e-3, 1e-2)?;
    assert_eq!(summary.checked, g.size_var());
    assert!(summary.max_error < 1e-2);
    Ok(())
}

#[test]
fn test_grad_check_binary_and_elementwise() -> Result<(), GradCheckError> {
    let mut b = GraphBuilder::with_seed(3);
    let x = b.feed(&[3, 2])?;
    b.set_flags(x, Flags::INPUT)?;
    let w = b.var(&[2], vec![0.7, 1.3])?;
    let shift = b.var(&[2], vec![2.0, 1.5])?;
    let a = b.mul(x, w)?;
    let a = b.add(a, shift)?;
    // strictly positive on the bound input
    let r = b.relu(a)?;
    let l = b.log(r)?;
    let e = b.exp(l)?;
    let s = b.sub(e, w)?;
    let o = b.one_minus(s)?;
    let p = b.sigm(o)?;
    b.set_flags(p, Flags::OUTPUT)?;
    let t = b.feed(&[3, 2])?;
    b.set_flags(t, Flags::TRUTH)?;
    let cost = b.ce_bin(p, t)?;
    let mut g = Graph::new(b, cost, &[])?;
    bind(&mut g, Flags::INPUT, vec![0.1, 0.2, -0.3, 0.4, 0.5, -0.6])?;
    bind(&mut g, Flags::TRUTH, vec![1.0, 0.0, 0.0, 1.0, 1.0, 0.0])?;
    let summary = check_grad(&mut g, 0, 1e-3, 1e-2)?;
    assert_eq!(summary.checked, 4);
    Ok(())
}

#[test]
fn test_grad_check_leaves_parameters_unchanged() -> Result<(), GradCheckError> {
    let mut g = classifier()?;
    let before = g.params().to_vec();
    check_grad(&mut g, 0, 1e-3, 1e-2)?;
    assert_eq!(g.params(), before.as_slice());
    Ok(())
}

#[test]
fn test_grad_check_rejects_bad_epsilon() -> Result<(), NeuroGraphError> {
    let mut g = classifier()?;
    assert!(matches!(
        check_grad(&mut g, 0, 0.0, 1e-2),
        Err(GradCheckError::InvalidEpsilon(_))
    ));
    assert!(matches!(
        check_grad(&mut g, 3, 1e-3, 1e-2),
        Err(GradCheckError::Evaluation(NeuroGraphError::NodeNotFound { .. }))
    ));
    Ok(())
}

#[test]
fn test_gradients_accumulate_over_shared_uses() -> Result<(), NeuroGraphError> {
    let mut b = GraphBuilder::with_seed(0);
    let w = b.var(&[2], vec![1.0, -2.0])?;
    let twice = b.add(w, w)?;
    let sq = b.mul(twice, w)?;
    let cost = b.reduce_sum(sq, 0)?;
    let mut g = Graph::new(b, cost, &[])?;
    // cost = sum(2 w^2)
    assert_relative_eq!(g.cost(0, true)?, 10.0);
    check_slice_near(g.grads(), &[4.0, -8.0], 1e-6);
    // a second pass starts from zeroed gradients
    g.cost(0, true)?;
    check_slice_near(g.grads(), &[4.0, -8.0], 1e-6);
    Ok(())
}

#[test]
fn test_gradient_flow_flags() -> Result<(), NeuroGraphError> {
    let mut b = GraphBuilder::with_seed(0);
    let x = b.feed(&[1, 2])?;
    let c = b.constant(&[2], vec![1.0, 1.0])?;
    let w = b.var(&[2], vec![1.0, 1.0])?;
    let xc = b.mul(x, c)?;
    let y = b.mul(xc, w)?;
    let s = b.reduce_sum(y, 1)?;
    let cost = b.reduce_sum(s, 0)?;
    let g = Graph::new(b, cost, &[])?;
    for node in g.nodes() {
        let expected = matches!(node.op, crate::ops::Op::Var)
            || node.preds.iter().any(|&p| g.nodes()[p].requires_grad());
        assert_eq!(node.requires_grad(), expected);
    }
    let xc_node = g
        .nodes()
        .iter()
        .find(|n| n.preds.len() == 2 && n.preds.iter().all(|&p| !g.nodes()[p].requires_grad()));
    assert!(xc_node.map_or(false, |n| !n.requires_grad()));
    Ok(())
}

#[test]
fn test_class_error_counts_argmax_mismatches() -> Result<(), NeuroGraphError> {
    let mut b = GraphBuilder::with_seed(0);
    let x = b.feed(&[4, 2])?;
    b.set_flags(x, Flags::INPUT)?;
    let out = b.softmax(x)?;
    let t = b.feed(&[4, 2])?;
    b.set_flags(t, Flags::TRUTH)?;
    let cost = b.ce_multi(out, t)?;
    let mut g = Graph::new(b, cost, &[])?;
    bind(&mut g, Flags::INPUT, vec![2.0, 1.0, 0.0, 1.0, 5.0, 0.0, 1.0, 2.0])?;
    // last row is not a distribution and is skipped
    bind(&mut g, Flags::TRUTH, vec![1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0])?;
    g.cost(0, false)?;
    assert_eq!(g.class_error()?, (2, 3));
    Ok(())
}

#[test]
fn test_dropout_modes() -> Result<(), NeuroGraphError> {
    let mut b = GraphBuilder::with_seed(0);
    let x = b.feed(&[1, 64])?;
    b.set_flags(x, Flags::INPUT)?;
    let d = b.dropout(x, 0.5)?;
    b.set_flags(d, Flags::OUTPUT)?;
    let s = b.reduce_sum(d, 1)?;
    let cost = b.reduce_sum(s, 0)?;
    let mut g = Graph::new(b, cost, &[])?;
    bind(&mut g, Flags::INPUT, vec![1.0; 64])?;
    let out = g.find(Flags::OUTPUT, 0)?;

    g.eval(Flags::OUTPUT, 0)?;
    let first = g.value(out)?.to_vec();
    g.eval(Flags::OUTPUT, 0)?;
    assert_eq!(g.value(out)?, first.as_slice());
    assert_eq!(first, vec![1.0; 64]);

    g.switch_mode(true);
    g.seed(42);
    g.eval(Flags::OUTPUT, 0)?;
    let masked = g.value(out)?.to_vec();
    assert!(masked.iter().all(|&v| v == 0.0 || v == 2.0));
    assert!(masked.iter().any(|&v| v == 0.0));
    g.seed(42);
    g.eval(Flags::OUTPUT, 0)?;
    assert_eq!(g.value(out)?, masked.as_slice());

    // gradient follows the mask
    g.seed(42);
    g.cost(0, true)?;
    Ok(())
}

#[test]
fn test_switch_selects_by_mode() -> Result<(), NeuroGraphError> {
    let mut b = GraphBuilder::with_seed(0);
    let w_eval = b.var(&[1], vec![3.0])?;
    let w_train = b.var(&[1], vec![5.0])?;
    let sel = b.switch(w_eval, w_train)?;
    let cost = b.reduce_sum(sel, 0)?;
    let mut g = Graph::new(b, cost, &[])?;
    assert_relative_eq!(g.cost(0, true)?, 3.0);
    let eval_grads = g.grads().to_vec();
    g.switch_mode(true);
    assert_relative_eq!(g.cost(0, true)?, 5.0);
    let train_grads = g.grads().to_vec();
    assert_relative_eq!(eval_grads.iter().sum::<f32>(), 1.0);
    assert_relative_eq!(train_grads.iter().sum::<f32>(), 1.0);
    assert_ne!(eval_grads, train_grads);
    Ok(())
}
