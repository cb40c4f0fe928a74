//! Decoding cursor over one node's adjacency list

use crate::compression::{AdjacencyDecoder, BLOCK_SIZE};
use crate::{NodeId, Result};

/// Walks a node's targets (and properties) in ascending target order.
///
/// Decodes one block of up to 64 values at a time into a reusable buffer;
/// only the position state is owned, the bytes are borrowed from the graph.
pub struct AdjacencyCursor<'a> {
    bytes: &'a [u8],
    decoder: AdjacencyDecoder,
    with_properties: bool,
    targets: [u64; BLOCK_SIZE],
    properties: [f64; BLOCK_SIZE],
    pos: usize,
    len: usize,
    remaining: usize,
}

impl<'a> AdjacencyCursor<'a> {
    pub(crate) fn new(bytes: &'a [u8], decoder: AdjacencyDecoder, with_properties: bool) -> Self {
        let remaining = decoder.remaining();
        Self {
            bytes,
            decoder,
            with_properties,
            targets: [0; BLOCK_SIZE],
            properties: [f64::NAN; BLOCK_SIZE],
            pos: 0,
            len: 0,
            remaining,
        }
    }

    /// Targets not yet returned.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    fn fill(&mut self) -> Result<bool> {
        if self.pos < self.len {
            return Ok(true);
        }
        let props = if self.with_properties {
            Some(&mut self.properties)
        } else {
            None
        };
        self.len = self.decoder.next_chunk(self.bytes, &mut self.targets, props)?;
        self.pos = 0;
        Ok(self.len > 0)
    }

    pub fn next_target(&mut self) -> Result<Option<NodeId>> {
        if !self.fill()? {
            return Ok(None);
        }
        let target = self.targets[self.pos];
        self.pos += 1;
        self.remaining -= 1;
        Ok(Some(target))
    }

    /// Next target with its relationship property (NaN when the graph has
    /// no relationship properties).
    pub fn next_with_property(&mut self) -> Result<Option<(NodeId, f64)>> {
        if !self.fill()? {
            return Ok(None);
        }
        let target = self.targets[self.pos];
        let property = if self.with_properties {
            self.properties[self.pos]
        } else {
            f64::NAN
        };
        self.pos += 1;
        self.remaining -= 1;
        Ok(Some((target, property)))
    }

    /// Advance to the first target `>= target` and return it.
    pub fn skip_until(&mut self, target: NodeId) -> Result<Option<NodeId>> {
        while let Some(next) = self.next_target()? {
            if next >= target {
                return Ok(Some(next));
            }
        }
        Ok(None)
    }

    /// Advance past `n` targets, returning the one after them.
    pub fn nth_target(&mut self, n: usize) -> Result<Option<NodeId>> {
        for _ in 0..n {
            if self.next_target()?.is_none() {
                return Ok(None);
            }
        }
        self.next_target()
    }

    pub fn collect_targets(mut self) -> Result<Vec<NodeId>> {
        let mut out = Vec::with_capacity(self.remaining);
        while let Some(t) = self.next_target()? {
            out.push(t);
        }
        Ok(out)
    }
}

impl Iterator for AdjacencyCursor<'_> {
    type Item = Result<NodeId>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_target().transpose()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
