//! On-disk format for compressed graphs
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ Header (48 bytes)                    │
//! │  - magic "KNNG", version             │
//! │  - compression tag, property flag    │
//! │  - node / relationship count         │
//! │  - meta length, adjacency length     │
//! │  - CRC32 over meta + adjacency       │
//! ├──────────────────────────────────────┤
//! │ Meta (bincode)                       │
//! │  - offsets, degrees                  │
//! │  - node property columns             │
//! ├──────────────────────────────────────┤
//! │ Adjacency bytes                      │
//! └──────────────────────────────────────┘
//! ```

use super::properties::{NodePropertyStore, NodePropertyValues};
use super::{AdjacencyBytes, CompressedGraph, CsrTopology};
use crate::compression::Compression;
use crate::{KnnError, Result};
use memmap2::MmapOptions;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

const MAGIC: &[u8; 4] = b"KNNG";
const VERSION: u32 = 1;
const HEADER_SIZE: usize = 48;

#[derive(Serialize, Deserialize)]
struct GraphMeta {
    offsets: Vec<u64>,
    degrees: Vec<u32>,
    properties: Vec<(String, NodePropertyValues)>,
}

struct Header {
    compression: Compression,
    has_properties: bool,
    node_count: u64,
    relationship_count: u64,
    meta_len: u64,
    adjacency_len: u64,
    checksum: u32,
}

impl Header {
    fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4..8].copy_from_slice(&VERSION.to_le_bytes());
        buf[8] = self.compression.tag();
        buf[9] = self.has_properties as u8;
        buf[12..20].copy_from_slice(&self.node_count.to_le_bytes());
        buf[20..28].copy_from_slice(&self.relationship_count.to_le_bytes());
        buf[28..36].copy_from_slice(&self.meta_len.to_le_bytes());
        buf[36..44].copy_from_slice(&self.adjacency_len.to_le_bytes());
        buf[44..48].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(KnnError::Corruption(format!(
                "file too short for header: {} bytes",
                bytes.len()
            )));
        }
        if &bytes[0..4] != MAGIC {
            return Err(KnnError::Corruption("bad magic".into()));
        }
        let version = u32::from_le_bytes(le_array(&bytes[4..8]));
        if version != VERSION {
            return Err(KnnError::Corruption(format!(
                "unsupported version {}",
                version
            )));
        }
        let compression = Compression::from_tag(bytes[8])
            .map_err(|e| KnnError::Corruption(e.to_string()))?;

        Ok(Self {
            compression,
            has_properties: bytes[9] != 0,
            node_count: u64::from_le_bytes(le_array(&bytes[12..20])),
            relationship_count: u64::from_le_bytes(le_array(&bytes[20..28])),
            meta_len: u64::from_le_bytes(le_array(&bytes[28..36])),
            adjacency_len: u64::from_le_bytes(le_array(&bytes[36..44])),
            checksum: u32::from_le_bytes(le_array(&bytes[44..48])),
        })
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

fn checksum(meta: &[u8], adjacency: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(meta);
    hasher.update(adjacency);
    hasher.finalize()
}

impl CompressedGraph {
    /// Write the graph, including node properties, to `path`.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let topology = self.topology();
        let meta = bincode::serialize(&GraphMeta {
            offsets: topology.offsets.clone(),
            degrees: topology.degrees.clone(),
            properties: self.property_store().to_sorted_vec(),
        })?;

        let header = Header {
            compression: topology.compression,
            has_properties: topology.has_properties,
            node_count: topology.node_count,
            relationship_count: topology.relationship_count,
            meta_len: meta.len() as u64,
            adjacency_len: topology.adjacency.len() as u64,
            checksum: checksum(&meta, &topology.adjacency),
        };

        let mut file = BufWriter::new(
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?,
        );
        file.write_all(&header.encode())?;
        file.write_all(&meta)?;
        file.write_all(&topology.adjacency)?;
        file.flush()?;
        file.get_ref().sync_all()?;

        info!(
            "[Graph] Wrote {} nodes / {} relationships to {:?}",
            topology.node_count, topology.relationship_count, path
        );
        Ok(())
    }

    /// Load a graph written by [`write_to`](Self::write_to). The adjacency
    /// section stays memory-mapped for the lifetime of the graph.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only; the file must not be modified
        // while a graph opened from it is alive
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        let header = Header::decode(&mmap)?;
        let (meta_end, adjacency_end) = section_bounds(&header)?;
        if adjacency_end != mmap.len() {
            return Err(KnnError::Corruption(format!(
                "expected {} bytes, file has {}",
                adjacency_end,
                mmap.len()
            )));
        }

        let meta_bytes = &mmap[HEADER_SIZE..meta_end];
        let actual = checksum(meta_bytes, &mmap[meta_end..adjacency_end]);
        if actual != header.checksum {
            return Err(KnnError::Corruption(format!(
                "checksum mismatch: expected {:08x}, got {:08x}",
                header.checksum, actual
            )));
        }

        let meta: GraphMeta = bincode::deserialize(meta_bytes)
            .map_err(|e| KnnError::Corruption(format!("meta: {}", e)))?;
        check_layout(&header, &meta)?;

        let mut properties = NodePropertyStore::new();
        for (name, values) in meta.properties {
            properties.insert(name, values, header.node_count)?;
        }

        let graph = CompressedGraph::from_parts(
            CsrTopology {
                compression: header.compression,
                node_count: header.node_count,
                relationship_count: header.relationship_count,
                has_properties: header.has_properties,
                offsets: meta.offsets,
                degrees: meta.degrees,
                adjacency: AdjacencyBytes::Mapped {
                    map: mmap,
                    start: meta_end,
                },
            },
            properties,
        );
        info!(
            "[Graph] Opened {:?}: {} nodes / {} relationships",
            path,
            graph.node_count(),
            graph.relationship_count()
        );
        Ok(graph)
    }
}

/// End offsets of the meta and adjacency sections. Header lengths are
/// untrusted, so every step is checked.
fn section_bounds(header: &Header) -> Result<(usize, usize)> {
    let overflow = || {
        KnnError::Corruption(format!(
            "section lengths overflow: meta {} / adjacency {}",
            header.meta_len, header.adjacency_len
        ))
    };
    let meta_len = usize::try_from(header.meta_len).map_err(|_| overflow())?;
    let adjacency_len = usize::try_from(header.adjacency_len).map_err(|_| overflow())?;
    let meta_end = HEADER_SIZE.checked_add(meta_len).ok_or_else(overflow)?;
    let adjacency_end = meta_end.checked_add(adjacency_len).ok_or_else(overflow)?;
    Ok((meta_end, adjacency_end))
}

fn check_layout(header: &Header, meta: &GraphMeta) -> Result<()> {
    let n = header.node_count;
    let offsets_ok = n.checked_add(1) == Some(meta.offsets.len() as u64);
    if !offsets_ok || meta.degrees.len() as u64 != n {
        return Err(KnnError::Corruption(format!(
            "{} offsets / {} degrees for {} nodes",
            meta.offsets.len(),
            meta.degrees.len(),
            n
        )));
    }
    if meta.offsets.windows(2).any(|w| w[0] > w[1])
        || meta.offsets.last().copied() != Some(header.adjacency_len)
    {
        return Err(KnnError::Corruption("offsets not monotonic".into()));
    }
    let total: u64 = meta.degrees.iter().map(|&d| d as u64).sum();
    if total != header.relationship_count {
        return Err(KnnError::Corruption(format!(
            "degrees sum to {}, header says {}",
            total, header.relationship_count
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::TailStrategy;
    use crate::graph::GraphBuilder;
    use tempfile::TempDir;

    fn sample(compression: Compression) -> CompressedGraph {
        let mut builder = GraphBuilder::new(50).compression(compression);
        for s in 0..50u64 {
            for t in 0..(s % 7) {
                builder.add_relationship_with_property(s, (s + t * 3) % 50, t as f64).unwrap();
            }
        }
        builder
            .add_node_property("score", NodePropertyValues::Double((0..50).map(|i| i as f64).collect()))
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        for compression in [
            Compression::Uncompressed,
            Compression::VarLong,
            Compression::Packed(TailStrategy::PackedTail),
        ] {
            let path = dir.path().join(format!("graph-{}.knng", compression.tag()));
            let graph = sample(compression);
            graph.write_to(&path).unwrap();

            let loaded = CompressedGraph::open(&path).unwrap();
            assert_eq!(loaded.node_count(), graph.node_count());
            assert_eq!(loaded.relationship_count(), graph.relationship_count());
            assert_eq!(loaded.compression(), compression);
            for node in 0..50 {
                assert_eq!(loaded.neighbors(node).unwrap(), graph.neighbors(node).unwrap());
            }
            let score = loaded.node_properties("score").unwrap();
            assert_eq!(score.double_value(7), Some(7.0));
        }
    }

    #[test]
    fn test_flipped_byte_is_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.knng");
        sample(Compression::VarLong).write_to(&path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let err = CompressedGraph::open(&path).unwrap_err();
        assert!(matches!(err, KnnError::Corruption(_)), "{:?}", err);
    }

    #[test]
    fn test_bad_magic_and_truncation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.knng");
        sample(Compression::VarLong).write_to(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        std::fs::write(&path, &bad_magic).unwrap();
        assert!(matches!(CompressedGraph::open(&path), Err(KnnError::Corruption(_))));

        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        assert!(matches!(CompressedGraph::open(&path), Err(KnnError::Corruption(_))));

        std::fs::write(&path, &bytes[..10]).unwrap();
        assert!(matches!(CompressedGraph::open(&path), Err(KnnError::Corruption(_))));
    }

    #[test]
    fn test_oversized_section_lengths_are_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.knng");
        sample(Compression::VarLong).write_to(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();

        // lengths whose wrapped sum would match the file size
        let mut wrapped = bytes.clone();
        wrapped[28..36].copy_from_slice(&u64::MAX.to_le_bytes());
        wrapped[36..44].copy_from_slice(&(bytes.len() as u64 - 47).to_le_bytes());
        std::fs::write(&path, &wrapped).unwrap();
        assert!(matches!(CompressedGraph::open(&path), Err(KnnError::Corruption(_))));

        let mut huge = bytes.clone();
        huge[36..44].copy_from_slice(&u64::MAX.to_le_bytes());
        std::fs::write(&path, &huge).unwrap();
        assert!(matches!(CompressedGraph::open(&path), Err(KnnError::Corruption(_))));
    }

    #[test]
    fn test_node_count_overflow_is_corruption() {
        let header = Header {
            compression: Compression::VarLong,
            has_properties: false,
            node_count: u64::MAX,
            relationship_count: 0,
            meta_len: 0,
            adjacency_len: 0,
            checksum: 0,
        };
        let meta = GraphMeta {
            offsets: vec![0],
            degrees: Vec::new(),
            properties: Vec::new(),
        };
        assert!(matches!(check_layout(&header, &meta), Err(KnnError::Corruption(_))));
    }

    #[test]
    fn test_opened_graph_reads_from_mapping() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.knng");
        let graph = sample(Compression::Packed(TailStrategy::VarLongTail));
        graph.write_to(&path).unwrap();

        let loaded = CompressedGraph::open(&path).unwrap();
        assert!(!graph.is_memory_mapped());
        assert!(loaded.is_memory_mapped());
        assert_eq!(loaded.memory_usage(), graph.memory_usage());
        loaded.validate().unwrap();
    }
}
