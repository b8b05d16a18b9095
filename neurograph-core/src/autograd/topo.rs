/// Post-order traversal of the predecessor edges reachable from `roots`.
///
/// Returns node indices with every predecessor listed before its successors.
/// `preds(i)` lists the predecessors of node `i`; `extra(i)` may name further
/// nodes that must be kept (a state leaf's recurrence source) without being an
/// edge. Those are visited after the traversal that discovered them, so the
/// ordering stays valid. Iterative to avoid deep recursion on long unrolled chains.
pub(crate) fn post_order<'a, P, E>(n: usize, roots: &[usize], preds: P, extra: E) -> Vec<usize>
where
    P: Fn(usize) -> &'a [usize],
    E: Fn(usize) -> Option<usize>,
{
    let mut visited = vec![false; n];
    let mut order = Vec::new();
    // popped from the back, so roots are traversed in the order given
    let mut pending: Vec<usize> = roots.iter().rev().copied().collect();
    // (node, index of the next predecessor to visit)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    while let Some(root) = pending.pop() {
        if visited[root] {
            continue;
        }
        visited[root] = true;
        stack.push((root, 0));
        while let Some(top) = stack.last_mut() {
            let node = top.0;
            let ps = preds(node);
            if top.1 < ps.len() {
                let p = ps[top.1];
                top.1 += 1;
                if !visited[p] {
                    visited[p] = true;
                    stack.push((p, 0));
                }
            } else {
                stack.pop();
                order.push(node);
                if let Some(e) = extra(node) {
                    if !visited[e] {
                        pending.push(e);
                    }
                }
            }
        }
    }
    order
}

/// Marks `roots` and everything they depend on. Indices must be topologically ordered.
pub(crate) fn ancestors<'a, P>(n: usize, roots: &[usize], preds: P) -> Vec<bool>
where
    P: Fn(usize) -> &'a [usize],
{
    let mut mask = vec![false; n];
    for &r in roots {
        mask[r] = true;
    }
    for i in (0..n).rev() {
        if mask[i] {
            for &p in preds(i) {
                mask[p] = true;
            }
        }
    }
    mask
}
