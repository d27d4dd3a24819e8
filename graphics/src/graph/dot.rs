//! Graphviz dump of a render graph, for debugging.
//!
//! ```ignore
//! std::fs::write("frame.dot", vesta_graphics::graph::dot::dump(&allocator, &graph))?;
//! // dot -Tsvg frame.dot -o frame.svg
//! ```

use std::fmt;

use crate::backend::PipelineBarrier;
use crate::types::AccessMode;

use super::allocator::{Graph, RenderGraphAllocator};
use super::compiler::{self, ImageLayouts};
use super::node::{Node, NodeHandle};

/// Render `graph` in the DOT language.
///
/// Nodes appear in execution order, labeled with their name and declared
/// accesses. Edges carry the resources synchronized by the barrier in front
/// of their target. A graph that fails to compile is still rendered, without
/// barriers, and the error is written as a comment.
pub fn dump(allocator: &RenderGraphAllocator, graph: &Graph) -> String {
    DotGraph { allocator, graph }.to_string()
}

struct DotGraph<'a> {
    allocator: &'a RenderGraphAllocator,
    graph: &'a Graph,
}

impl fmt::Display for DotGraph<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "digraph render_graph {{")?;
        writeln!(f, "    rankdir=LR;")?;
        writeln!(f, "    node [shape=box, fontname=\"monospace\"];")?;

        let nodes: Vec<(NodeHandle, Option<PipelineBarrier>)> =
            match compiler::compile(self.allocator, self.graph, &ImageLayouts::new()) {
                Ok(compiled) => compiled
                    .iter()
                    .map(|(handle, barrier)| (handle, barrier.cloned()))
                    .collect(),
                Err(e) => {
                    writeln!(f, "    // error: {e}")?;
                    self.allocator
                        .reachable(self.graph)
                        .into_iter()
                        .map(|handle| (handle, None))
                        .collect()
                }
            };

        for (handle, barrier) in &nodes {
            let node = self.allocator.node(*handle);
            let mut label = escape(node.name());
            for access in node.buffers() {
                label.push_str(&format!(
                    "\\n{} buffer {}",
                    mode(access.mode()),
                    access.range.buffer.as_raw()
                ));
            }
            for access in node.images() {
                label.push_str(&format!(
                    "\\n{} image {} mip {} layer {} ({:?})",
                    mode(access.mode()),
                    access.range.image.as_raw(),
                    access.range.mip_level,
                    access.range.array_layer,
                    access.layout
                ));
            }
            if let Some(barrier) = barrier {
                label.push_str(&format!("\\nsync: {}", describe(barrier, None)));
            }
            writeln!(f, "    n{} [label=\"{}\"];", handle.index(), label)?;
        }

        for (handle, _) in &nodes {
            let node = self.allocator.node(*handle);
            for &next in node.next() {
                let barrier = nodes
                    .iter()
                    .find(|(h, _)| *h == next)
                    .and_then(|(_, barrier)| barrier.as_ref());
                let synced = barrier.map(|b| describe(b, Some(node))).unwrap_or_default();

                if synced.is_empty() {
                    writeln!(f, "    n{} -> n{};", handle.index(), next.index())?;
                } else {
                    writeln!(
                        f,
                        "    n{} -> n{} [label=\"{}\"];",
                        handle.index(),
                        next.index(),
                        synced
                    )?;
                }
            }
        }

        writeln!(f, "}}")
    }
}

fn mode(mode: AccessMode) -> &'static str {
    match mode {
        AccessMode::Read => "R",
        AccessMode::Write => "W",
        AccessMode::ReadWrite => "RW",
    }
}

/// List the resources of `barrier`, restricted to those `producer` declared.
fn describe(barrier: &PipelineBarrier, producer: Option<&Node>) -> String {
    let mut parts = Vec::new();
    for b in &barrier.buffer_barriers {
        let declared = producer.is_none_or(|node| {
            node.buffers()
                .iter()
                .any(|access| access.range.buffer == b.range.buffer)
        });
        if declared {
            parts.push(format!("buffer {}", b.range.buffer.as_raw()));
        }
    }
    for b in &barrier.image_barriers {
        let declared = producer.is_none_or(|node| {
            node.images()
                .iter()
                .any(|access| access.range.image == b.range.image)
        });
        if declared {
            parts.push(format!(
                "image {} {:?}->{:?}",
                b.range.image.as_raw(),
                b.old_layout,
                b.new_layout
            ));
        }
    }
    parts.join(", ")
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
