// neurograph-core/src/io.rs

//! Binary model persistence.
//!
//! All integers and floats are little-endian:
//!
//! ```text
//! magic "NGRF" | version u32 | node count u32
//! per node:   op code u32
//!             int params  (u32 count, i32 values)
//!             float params (u32 count, f32 values)
//!             dims (u32 count, u32 values)
//!             flags u32 | label i32 | pre i32 (-1 when absent)
//!             preds (u32 count, u32 indices of earlier nodes)
//! parameter store (u32 count, f32 values)
//! constant store  (u32 count, f32 values)
//! ```
//!
//! Loading checks the whole stream before building anything. A loaded graph has
//! batch size 1, is in eval mode and has no feed buffer bound.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::NeuroGraphError;
use crate::graph::{infer_dims, Graph, Model, Store};
use crate::node::{Binding, Flags, Node};
use crate::ops::{checked_shape_len, Op};

const MAGIC: &[u8; 4] = b"NGRF";
const VERSION: u32 = 1;
/// Upper bound on pre-allocation from untrusted counts.
const MAX_PREALLOC: usize = 1 << 16;
/// Largest element count a loaded node may have.
const MAX_NODE_LEN: usize = 1 << 28;

fn write_len<W: Write>(writer: &mut W, len: usize) -> Result<(), NeuroGraphError> {
    let len = u32::try_from(len)
        .map_err(|_| NeuroGraphError::IoError(format!("length {} does not fit the model format", len)))?;
    writer.write_u32::<LittleEndian>(len)?;
    Ok(())
}

fn write_f32s<W: Write>(writer: &mut W, values: &[f32]) -> Result<(), NeuroGraphError> {
    write_len(writer, values.len())?;
    for &v in values {
        writer.write_f32::<LittleEndian>(v)?;
    }
    Ok(())
}

/// Writes `graph` to `writer`.
pub fn save<W: Write>(graph: &Graph, mut writer: W) -> Result<(), NeuroGraphError> {
    writer.write_all(MAGIC)?;
    writer.write_u32::<LittleEndian>(VERSION)?;
    let nodes = graph.nodes();
    write_len(&mut writer, nodes.len())?;
    for node in nodes {
        let (ints, floats) = node.op.params();
        writer.write_u32::<LittleEndian>(node.op.code())?;
        write_len(&mut writer, ints.len())?;
        for v in ints {
            writer.write_i32::<LittleEndian>(v)?;
        }
        write_f32s(&mut writer, &floats)?;
        write_len(&mut writer, node.shape.len())?;
        for &d in &node.shape {
            write_len(&mut writer, d)?;
        }
        writer.write_u32::<LittleEndian>(node.flags.bits())?;
        writer.write_i32::<LittleEndian>(node.label)?;
        let pre = match node.pre {
            Some(p) => i32::try_from(p)
                .map_err(|_| NeuroGraphError::IoError(format!("node index {} too large", p)))?,
            None => -1,
        };
        writer.write_i32::<LittleEndian>(pre)?;
        write_len(&mut writer, node.preds.len())?;
        for &p in &node.preds {
            write_len(&mut writer, p)?;
        }
    }
    write_f32s(&mut writer, graph.params())?;
    write_f32s(&mut writer, graph.consts())?;
    writer.flush()?;
    Ok(())
}

fn read_len<R: Read>(reader: &mut R) -> Result<usize, NeuroGraphError> {
    Ok(reader.read_u32::<LittleEndian>()? as usize)
}

fn read_f32s<R: Read>(reader: &mut R) -> Result<Vec<f32>, NeuroGraphError> {
    let n = read_len(reader)?;
    let mut out = Vec::with_capacity(n.min(MAX_PREALLOC));
    for _ in 0..n {
        out.push(reader.read_f32::<LittleEndian>()?);
    }
    Ok(out)
}

fn corrupt(index: usize, what: impl std::fmt::Display) -> NeuroGraphError {
    NeuroGraphError::CorruptModel(format!("node {}: {}", index, what))
}

fn read_node<R: Read>(reader: &mut R, index: usize, count: usize) -> Result<Node, NeuroGraphError> {
    let code = reader.read_u32::<LittleEndian>()?;
    let n_ints = read_len(reader)?;
    let mut ints = Vec::with_capacity(n_ints.min(MAX_PREALLOC));
    for _ in 0..n_ints {
        ints.push(reader.read_i32::<LittleEndian>()?);
    }
    let floats = read_f32s(reader)?;
    let op = Op::from_code(code, &ints, &floats)?;

    let rank = read_len(reader)?;
    let mut shape = Vec::with_capacity(rank.min(MAX_PREALLOC));
    for _ in 0..rank {
        shape.push(read_len(reader)?);
    }
    let len = checked_shape_len(&shape)
        .filter(|&n| n <= MAX_NODE_LEN)
        .ok_or_else(|| corrupt(index, format!("shape {:?} is too large", shape)))?;
    let flags = Flags::from_bits(reader.read_u32::<LittleEndian>()?);
    let label = reader.read_i32::<LittleEndian>()?;
    let pre = match reader.read_i32::<LittleEndian>()? {
        -1 => None,
        p if p >= 0 && (p as usize) < count => Some(p as usize),
        p => return Err(corrupt(index, format!("recurrence source {} out of range", p))),
    };
    let n_preds = read_len(reader)?;
    let mut preds = Vec::with_capacity(n_preds.min(MAX_PREALLOC));
    for _ in 0..n_preds {
        let p = read_len(reader)?;
        if p >= index {
            return Err(corrupt(index, format!("predecessor {} is not an earlier node", p)));
        }
        preds.push(p);
    }

    if op.is_leaf() && !preds.is_empty() {
        return Err(corrupt(index, format!("leaf '{}' has predecessors", op.name())));
    }
    if op.is_batched_leaf() && shape.first().map_or(true, |&d| d == 0) {
        return Err(corrupt(index, format!("'{}' leaf without a batch dimension", op.name())));
    }
    match (&op, pre) {
        (Op::State, None) => return Err(corrupt(index, "state leaf without recurrence")),
        (Op::State, Some(_)) | (_, None) => {}
        (_, Some(_)) => return Err(corrupt(index, "only state leaves carry a recurrence")),
    }

    let binding = match op {
        // offsets are assigned once every node is known
        Op::Var => Binding::Param { offset: 0, len },
        Op::Const => Binding::Const { offset: 0, len },
        Op::Feed => Binding::External(None),
        _ => Binding::scratch(),
    };
    Ok(Node {
        op,
        shape,
        flags,
        label,
        preds,
        pre,
        binding,
        back: false,
    })
}

/// Reads a graph written by [`save`].
pub fn load<R: Read>(mut reader: R) -> Result<Graph, NeuroGraphError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(NeuroGraphError::CorruptModel("not a neurograph model".to_string()));
    }
    let version = reader.read_u32::<LittleEndian>()?;
    if version != VERSION {
        return Err(NeuroGraphError::CorruptModel(format!(
            "unsupported format version {}",
            version
        )));
    }
    let count = read_len(&mut reader)?;
    let mut nodes = Vec::with_capacity(count.min(MAX_PREALLOC));
    for index in 0..count {
        nodes.push(read_node(&mut reader, index, count)?);
    }
    // stored shapes must be the ones the graph would infer, which bounds every buffer
    let batch = nodes
        .iter()
        .find(|n| n.op.is_batched_leaf())
        .map_or(1, |n| n.shape[0]);
    let inferred = infer_dims(&nodes, batch).map_err(|e| NeuroGraphError::CorruptModel(e.to_string()))?;
    for (index, (node, shape)) in nodes.iter().zip(&inferred).enumerate() {
        if node.shape != *shape {
            return Err(corrupt(
                index,
                format!("stored shape {:?} differs from inferred shape {:?}", node.shape, shape),
            ));
        }
    }
    let x = read_f32s(&mut reader)?;
    let c = read_f32s(&mut reader)?;

    let (mut x_len, mut c_len) = (0, 0);
    for node in nodes.iter_mut() {
        match &mut node.binding {
            Binding::Param { offset, len } => {
                *offset = x_len;
                x_len = x_len.saturating_add(*len);
            }
            Binding::Const { offset, len } => {
                *offset = c_len;
                c_len = c_len.saturating_add(*len);
            }
            _ => {}
        }
    }
    if x_len != x.len() || c_len != c.len() {
        return Err(NeuroGraphError::CorruptModel(format!(
            "stores hold {} parameters and {} constants, nodes need {} and {}",
            x.len(),
            c.len(),
            x_len,
            c_len
        )));
    }
    if !nodes
        .iter()
        .any(|n| n.flags.contains(Flags::COST) && n.shape.is_empty() && !n.op.is_leaf())
    {
        return Err(NeuroGraphError::CorruptModel("no zero-dimensional cost node".to_string()));
    }

    let store = Store {
        g: vec![0.0; x.len()],
        x,
        c,
    };
    let mut graph = Graph::from_parts(nodes, store, StdRng::from_entropy()).map_err(|e| match e {
        NeuroGraphError::IoError(_) | NeuroGraphError::CorruptModel(_) => e,
        other => NeuroGraphError::CorruptModel(other.to_string()),
    })?;
    graph.set_batch_size(1)?;
    debug!(
        "model loaded: {} nodes, {} parameters, {} constants",
        graph.nodes().len(),
        graph.size_var(),
        graph.size_const()
    );
    Ok(graph)
}

pub fn save_file<P: AsRef<Path>>(graph: &Graph, path: P) -> Result<(), NeuroGraphError> {
    let file = File::create(path)?;
    save(graph, BufWriter::new(file))
}

pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Graph, NeuroGraphError> {
    let file = File::open(path)?;
    load(BufReader::new(file))
}

#[cfg(test)]
#[path = "io_test.rs"]
mod tests;
