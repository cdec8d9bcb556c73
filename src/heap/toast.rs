//! TOAST chunk indexing and reassembly.
//!
//! Oversized attributes live out of line in a sibling TOAST relation — an
//! ordinary heap whose rows are `(chunk_id oid, chunk_seq int, chunk_data
//! bytea)`. The resolver walks that relation once per session, indexing
//! the page location of every chunk by value ID, and serves fetches by
//! re-reading the referenced pages, concatenating the chunk payloads in
//! sequence order and decompressing when the external pointer says so.
//!
//! Chunk IDs get reused after vacuum, so one value ID may own several
//! generations of chunks. Grouping by proximity to each generation's
//! `chunk_seq = 0` block tells them apart; [`select_group`] keeps that
//! policy in one place.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use crate::heap::constants::*;
use crate::heap::page::{HeapPage, LpFlags, OpenedPage};
use crate::heap::relation::TabDescriptor;
use crate::heap::segment::SegmentSet;
use crate::heap::tuple::walk_attributes;
use crate::heap::varlena::{self, ExternalPointer, Varlena};
use crate::heap::HeapError;
use crate::PguError;

use byteorder::{ByteOrder, LittleEndian};

/// Location of one TOAST chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToastChunk {
    pub valueid: u32,
    pub chunk_seq: u32,
    pub block: u64,
    /// Line pointer slot (1-based).
    pub offset: u16,
    /// Marker carried through the drop-scan index file.
    pub suffix: i32,
}

/// Resolves external pointers against a TOAST relation.
pub struct ToastResolver {
    segments: Option<SegmentSet>,
    index: HashMap<u32, Vec<ToastChunk>>,
    built: bool,
    toast_desc: TabDescriptor,
}

impl ToastResolver {
    /// A resolver over the TOAST relation's segment files; the chunk
    /// index is built lazily on first fetch.
    pub fn new(segments: SegmentSet) -> Self {
        ToastResolver {
            segments: Some(segments),
            index: HashMap::new(),
            built: false,
            toast_desc: TabDescriptor::toast(),
        }
    }

    /// A resolver with no TOAST data; every fetch reports the value as
    /// missing (callers degrade to placeholders).
    pub fn unavailable() -> Self {
        ToastResolver {
            segments: None,
            index: HashMap::new(),
            built: true,
            toast_desc: TabDescriptor::toast(),
        }
    }

    /// A resolver over a pre-built index file (drop-scan mode), with the
    /// raw TOAST file for chunk payload reads.
    pub fn with_index_file(segments: SegmentSet, path: &Path) -> Result<Self, PguError> {
        let mut resolver = ToastResolver::new(segments);
        resolver.load_index_file(path)?;
        resolver.built = true;
        Ok(resolver)
    }

    /// Number of distinct value IDs currently indexed.
    pub fn indexed_values(&self) -> usize {
        self.index.len()
    }

    /// Walk the TOAST relation and index every decodable chunk location.
    /// Idempotent: an index already built (or loaded) is kept.
    pub fn build_index(&mut self) -> Result<(), PguError> {
        if self.built {
            return Ok(());
        }
        let Some(segments) = self.segments.as_mut() else {
            self.built = true;
            return Ok(());
        };

        let desc = self.toast_desc.clone();
        let index = &mut self.index;
        segments.for_each_block(|blkno, data| {
            let page = match HeapPage::open(data) {
                Ok(OpenedPage::Heap(p)) => p,
                _ => return Ok(()),
            };
            for (slot, lp) in page.items() {
                if lp.flags() != LpFlags::Normal {
                    continue;
                }
                let Ok(item) = page.item_bytes(&lp) else {
                    continue;
                };
                if let Some((valueid, chunk_seq)) = decode_chunk_key(item, &desc) {
                    index.entry(valueid).or_default().push(ToastChunk {
                        valueid,
                        chunk_seq,
                        block: blkno,
                        offset: slot as u16,
                        suffix: 0,
                    });
                }
            }
            Ok(())
        })?;

        self.built = true;
        Ok(())
    }

    /// Load chunk locations from a drop-scan `dbf_idx` file
    /// (`valueid\tchunk_seq\tblock\toffset\tsuffix` per line).
    pub fn load_index_file(&mut self, path: &Path) -> Result<(), PguError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PguError::Io(format!("Cannot read {}: {}", path.display(), e)))?;
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 5 {
                return Err(PguError::Parse(format!(
                    "{}:{}: expected 5 tab-separated fields",
                    path.display(),
                    lineno + 1
                )));
            }
            let parse_err = |what: &str| {
                PguError::Parse(format!("{}:{}: bad {}", path.display(), lineno + 1, what))
            };
            let chunk = ToastChunk {
                valueid: fields[0].parse().map_err(|_| parse_err("valueid"))?,
                chunk_seq: fields[1].parse().map_err(|_| parse_err("chunk_seq"))?,
                block: fields[2].parse().map_err(|_| parse_err("block"))?,
                offset: fields[3].parse().map_err(|_| parse_err("offset"))?,
                suffix: fields[4].parse().map_err(|_| parse_err("suffix"))?,
            };
            self.index.entry(chunk.valueid).or_default().push(chunk);
        }
        Ok(())
    }

    /// Write the chunk index in `dbf_idx` format.
    pub fn save_index_file(&self, path: &Path) -> Result<(), PguError> {
        let mut out = std::fs::File::create(path)
            .map_err(|e| PguError::Io(format!("Cannot create {}: {}", path.display(), e)))?;
        let mut valueids: Vec<&u32> = self.index.keys().collect();
        valueids.sort();
        for valueid in valueids {
            for c in &self.index[valueid] {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}\t{}",
                    c.valueid, c.chunk_seq, c.block, c.offset, c.suffix
                )
                .map_err(|e| PguError::Io(format!("Cannot write {}: {}", path.display(), e)))?;
            }
        }
        Ok(())
    }

    /// Fetch and reassemble the payload behind an external pointer.
    pub fn fetch(&mut self, ptr: &ExternalPointer) -> Result<Vec<u8>, HeapError> {
        if !self.built && self.build_index().is_err() {
            return Err(HeapError::ToastMissing {
                valueid: ptr.valueid,
            });
        }

        let chunks = match self.index.get(&ptr.valueid) {
            Some(c) if !c.is_empty() => c.clone(),
            _ => {
                return Err(HeapError::ToastMissing {
                    valueid: ptr.valueid,
                })
            }
        };

        let extsize = ptr.extsize() as usize;
        let groups = select_group(&chunks);

        let mut fallback: Option<Vec<u8>> = None;
        for group in &groups {
            if !is_dense(group) {
                continue;
            }
            let Ok(assembled) = self.assemble(group) else {
                continue;
            };
            if assembled.len() == extsize {
                return self.finish(ptr, assembled);
            }
            if fallback.is_none() {
                fallback = Some(assembled);
            }
        }

        match fallback {
            Some(assembled) => self.finish(ptr, assembled),
            None => Err(HeapError::ToastMissing {
                valueid: ptr.valueid,
            }),
        }
    }

    /// Concatenate the chunk payloads of one group.
    fn assemble(&mut self, group: &[ToastChunk]) -> Result<Vec<u8>, HeapError> {
        let mut out = Vec::new();
        for chunk in group {
            out.extend_from_slice(&self.chunk_data(chunk)?);
        }
        Ok(out)
    }

    /// Decompress (when flagged) and length-check the assembled value.
    fn finish(&self, ptr: &ExternalPointer, assembled: Vec<u8>) -> Result<Vec<u8>, HeapError> {
        let want = (ptr.rawsize as usize).saturating_sub(VARHDRSZ);

        if ptr.is_compressed() {
            if assembled.len() < 4 {
                return Err(HeapError::BadVarlena);
            }
            let tcinfo = LittleEndian::read_u32(&assembled[0..4]);
            let method =
                crate::heap::compression::CompressionMethod::from_bits(tcinfo >> VARLENA_EXTSIZE_BITS)?;
            // The pointer's extinfo records the method too; disagreement
            // means these chunks do not belong to this pointer.
            if ptr.method()? != method {
                return Err(HeapError::BadVarlena);
            }
            let out = crate::heap::compression::decompress(method, &assembled[4..], want)?;
            return Ok(out);
        }

        if assembled.len() != want {
            return Err(HeapError::BadVarlena);
        }
        Ok(assembled)
    }

    /// Read one chunk's payload bytes from the TOAST relation.
    fn chunk_data(&mut self, chunk: &ToastChunk) -> Result<Vec<u8>, HeapError> {
        let segments = self.segments.as_mut().ok_or(HeapError::ToastMissing {
            valueid: chunk.valueid,
        })?;
        let block = segments
            .read_block(chunk.block)
            .map_err(|_| HeapError::ItemOverrun)?;
        let page = match HeapPage::open(&block)? {
            OpenedPage::Heap(p) => p,
            OpenedPage::NewEmpty => return Err(HeapError::ItemOverrun),
        };
        let lp = page
            .line_pointer(chunk.offset as usize)
            .ok_or(HeapError::ItemOverrun)?;
        let item = page.item_bytes(&lp)?;

        let walked = walk_attributes(item, &self.toast_desc)?;
        let raw = walked
            .attrs
            .get(2)
            .copied()
            .flatten()
            .ok_or(HeapError::BadVarlena)?;
        match varlena::parse(raw)? {
            Varlena::Inline { data } | Varlena::Short { data } => Ok(data.to_vec()),
            // Chunk payloads are stored plain; anything else is corrupt.
            _ => Err(HeapError::BadVarlena),
        }
    }
}

/// Extract `(chunk_id, chunk_seq)` from a TOAST tuple, or None when the
/// item does not look like one.
fn decode_chunk_key(item: &[u8], desc: &TabDescriptor) -> Option<(u32, u32)> {
    let walked = walk_attributes(item, desc).ok()?;
    if walked.overflow_at.is_some() {
        return None;
    }
    let id_raw = walked.attrs.first().copied().flatten()?;
    let seq_raw = walked.attrs.get(1).copied().flatten()?;
    if id_raw.len() != 4 || seq_raw.len() != 4 {
        return None;
    }
    let seq = LittleEndian::read_i32(seq_raw);
    if seq < 0 {
        return None;
    }
    Some((LittleEndian::read_u32(id_raw), seq as u32))
}

/// True when the group's sequence numbers form a dense 0-based prefix.
fn is_dense(group: &[ToastChunk]) -> bool {
    group
        .iter()
        .enumerate()
        .all(|(i, c)| c.chunk_seq == i as u32)
}

/// Partition a value's chunks into generations.
///
/// With a single `chunk_seq = 0` chunk everything is one group. With
/// several (the value ID was reused), each seq-0 chunk seeds a group and
/// every other chunk joins the seed whose block number is nearest. Groups
/// come back seq-sorted, ordered by ascending block span so callers try
/// the most local generation first.
pub fn select_group(chunks: &[ToastChunk]) -> Vec<Vec<ToastChunk>> {
    let zeros: Vec<&ToastChunk> = chunks.iter().filter(|c| c.chunk_seq == 0).collect();

    if zeros.len() <= 1 {
        let mut all: Vec<ToastChunk> = chunks.to_vec();
        all.sort_by_key(|c| c.chunk_seq);
        return vec![all];
    }

    let mut seeds: Vec<&ToastChunk> = zeros;
    seeds.sort_by_key(|c| c.block);
    let mut groups: Vec<Vec<ToastChunk>> = seeds.iter().map(|z| vec![**z]).collect();

    for chunk in chunks.iter().filter(|c| c.chunk_seq != 0) {
        let mut best = 0usize;
        let mut best_diff = u64::MAX;
        for (gi, seed) in seeds.iter().enumerate() {
            let diff = chunk.block.abs_diff(seed.block);
            if diff < best_diff {
                best_diff = diff;
                best = gi;
            }
        }
        groups[best].push(*chunk);
    }

    for group in groups.iter_mut() {
        group.sort_by_key(|c| c.chunk_seq);
    }
    groups.sort_by_key(|g| {
        let min = g.iter().map(|c| c.block).min().unwrap_or(0);
        let max = g.iter().map(|c| c.block).max().unwrap_or(0);
        max - min
    });
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(valueid: u32, seq: u32, block: u64) -> ToastChunk {
        ToastChunk {
            valueid,
            chunk_seq: seq,
            block,
            offset: 1,
            suffix: 0,
        }
    }

    #[test]
    fn test_single_group_passthrough() {
        let chunks = vec![chunk(7, 2, 10), chunk(7, 0, 8), chunk(7, 1, 9)];
        let groups = select_group(&chunks);
        assert_eq!(groups.len(), 1);
        let seqs: Vec<u32> = groups[0].iter().map(|c| c.chunk_seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn test_collision_groups_by_block_proximity() {
        // Two generations: one around block 10, one around block 500.
        let chunks = vec![
            chunk(7, 0, 10),
            chunk(7, 1, 11),
            chunk(7, 0, 500),
            chunk(7, 1, 501),
            chunk(7, 2, 502),
        ];
        let groups = select_group(&chunks);
        assert_eq!(groups.len(), 2);
        for group in &groups {
            assert!(is_dense(group));
            let blocks: Vec<u64> = group.iter().map(|c| c.block).collect();
            let span = blocks.iter().max().unwrap() - blocks.iter().min().unwrap();
            assert!(span < 100, "groups must stay local: {:?}", blocks);
        }
    }

    #[test]
    fn test_dense_prefix_detection() {
        assert!(is_dense(&[chunk(1, 0, 0), chunk(1, 1, 1)]));
        assert!(!is_dense(&[chunk(1, 0, 0), chunk(1, 2, 1)]));
        assert!(!is_dense(&[chunk(1, 1, 0)]));
    }

    #[test]
    fn test_index_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dbf_idx");

        let mut resolver = ToastResolver::unavailable();
        resolver
            .index
            .entry(42)
            .or_default()
            .extend([chunk(42, 0, 3), chunk(42, 1, 4)]);
        resolver.save_index_file(&path).unwrap();

        let mut loaded = ToastResolver::unavailable();
        loaded.load_index_file(&path).unwrap();
        assert_eq!(loaded.indexed_values(), 1);
        assert_eq!(loaded.index[&42].len(), 2);
        assert_eq!(loaded.index[&42][1], chunk(42, 1, 4));
    }

    #[test]
    fn test_fetch_missing_value() {
        let mut resolver = ToastResolver::unavailable();
        let ptr = ExternalPointer {
            rawsize: 100,
            extinfo: 96,
            valueid: 9,
            toastrelid: 1,
        };
        assert_eq!(
            resolver.fetch(&ptr).unwrap_err(),
            HeapError::ToastMissing { valueid: 9 }
        );
    }
}
