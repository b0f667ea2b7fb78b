//! Perceptual fingerprints and duplicate detection across materials.
//!
//! A [`Fingerprint`] is computed from decoded pixels, so the same image
//! stored as PNG or TGA fingerprints identically. Pair candidates come from
//! bucketing, and no bucketing scheme may drop a pair within budget:
//!
//! - tight budgets use multi-index chunks: with a Hamming budget of `d` bits
//!   the fingerprint is split into `d + 1` chunks, and any two fingerprints
//!   within budget agree exactly on at least one chunk;
//! - wide budgets bucket by popcount, since two fingerprints within `d` bits
//!   have popcounts at most `d` apart.

use crate::image_loading::TextureSlot;
use crate::material::{luma, Texture, TextureSet};
use crate::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

pub const DEFAULT_DUPLICATE_THRESHOLD: f64 = 0.99;
pub const DEFAULT_SIMILAR_THRESHOLD: f64 = 0.80;

/// Total fingerprint length in bits
pub const FINGERPRINT_BITS: u32 = 256;

const GRID: usize = 8;

/// Buckets narrower than this match too often to be worth building.
const MIN_CHUNK_BITS: usize = 8;

/// Groups smaller than this are compared exhaustively.
const BUCKETING_MIN_GROUP: usize = 64;

/// 256-bit perceptual hash: average hash, horizontal gradient hash,
/// vertical gradient hash and a thermometer code of mean luminance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u64; 4]);

impl Fingerprint {
    pub fn compute(texture: &Texture) -> Self {
        let grid = luminance_grid(texture, GRID, GRID);
        let mean = grid.iter().sum::<f64>() / grid.len() as f64;
        let average = pack_bits(grid.iter().map(|&v| v > mean));

        let wide = luminance_grid(texture, GRID + 1, GRID);
        let horizontal = pack_bits(
            (0..GRID).flat_map(|y| {
                let row = &wide[y * (GRID + 1)..(y + 1) * (GRID + 1)];
                (0..GRID).map(move |x| row[x] < row[x + 1])
            }),
        );

        let tall = luminance_grid(texture, GRID, GRID + 1);
        let vertical =
            pack_bits((0..GRID).flat_map(|y| (0..GRID).map(move |x| (x, y))).map(|(x, y)| {
                tall[y * GRID + x] < tall[(y + 1) * GRID + x]
            }));

        Fingerprint([average, horizontal, vertical, thermometer(mean)])
    }

    pub fn hamming(&self, other: &Fingerprint) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    /// `1 - hamming / 256`, in `[0, 1]`.
    pub fn similarity(&self, other: &Fingerprint) -> f64 {
        1.0 - self.hamming(other) as f64 / FINGERPRINT_BITS as f64
    }

    fn popcount(&self) -> u32 {
        self.0.iter().map(|w| w.count_ones()).sum()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for word in self.0 {
            write!(f, "{:016x}", word)?;
        }
        Ok(())
    }
}

/// Box-averaged luminance over a `gw x gh` grid, row-major.
fn luminance_grid(texture: &Texture, gw: usize, gh: usize) -> Vec<f64> {
    let w = texture.width() as usize;
    let h = texture.height() as usize;
    let span = |cell: usize, cells: usize, len: usize| {
        let start = cell * len / cells;
        let end = ((cell + 1) * len / cells).max(start + 1).min(len);
        start.min(len - 1)..end
    };

    let mut grid = Vec::with_capacity(gw * gh);
    for gy in 0..gh {
        let rows = span(gy, gh, h);
        for gx in 0..gw {
            let cols = span(gx, gw, w);
            let mut sum = 0.0;
            let mut count = 0usize;
            for y in rows.clone() {
                for x in cols.clone() {
                    let i = (y * w + x) * 4;
                    let p = &texture.data()[i..i + 3];
                    sum += luma(p[0], p[1], p[2]);
                    count += 1;
                }
            }
            grid.push(if count > 0 { sum / count as f64 } else { 0.0 });
        }
    }
    grid
}

fn pack_bits(bits: impl Iterator<Item = bool>) -> u64 {
    bits.take(64)
        .enumerate()
        .fold(0u64, |acc, (i, bit)| if bit { acc | 1 << i } else { acc })
}

fn thermometer(mean: f64) -> u64 {
    let n = (mean / 255.0 * 64.0).round().clamp(0.0, 64.0) as u32;
    if n == 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}

/// One fingerprinted texture
#[derive(Debug, Clone)]
pub struct FingerprintEntry {
    pub material_index: usize,
    pub material_name: String,
    pub slot: TextureSlot,
    /// Source path, or `material:slot`
    pub label: String,
    pub fingerprint: Fingerprint,
}

/// Duplicate or near-duplicate textures in two different materials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicatePair {
    pub path_a: String,
    pub path_b: String,
    pub slot: TextureSlot,
    pub material_a: String,
    pub material_b: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateAnalysisResult {
    pub duplicate_pairs: Vec<DuplicatePair>,
    pub similar_pairs: Vec<DuplicatePair>,
    pub duplicate_threshold: f64,
    pub similar_threshold: f64,
}

pub(crate) fn check_thresholds(duplicate: f64, similar: f64) -> Result<()> {
    let ordered = (0.0..=1.0).contains(&similar)
        && (0.0..=1.0).contains(&duplicate)
        && similar <= duplicate;
    if !ordered {
        return Err(Error::InvalidParameter(format!(
            "thresholds must satisfy 0 <= similar ({}) <= duplicate ({}) <= 1",
            similar, duplicate
        )));
    }
    Ok(())
}

/// Largest Hamming distance still at or above `similar_threshold`.
fn max_distance(similar_threshold: f64) -> u32 {
    ((1.0 - similar_threshold) * FINGERPRINT_BITS as f64 + 1e-9).floor() as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateSearch {
    /// Exact agreement on one of `d + 1` chunks
    Chunks,
    /// Popcount levels at most `d` apart
    Levels,
    Exhaustive,
}

impl CandidateSearch {
    fn for_group(len: usize, max_distance: u32) -> Self {
        let chunk_bits = FINGERPRINT_BITS as usize / (max_distance as usize + 1);
        if len < BUCKETING_MIN_GROUP {
            CandidateSearch::Exhaustive
        } else if chunk_bits >= MIN_CHUNK_BITS {
            CandidateSearch::Chunks
        } else {
            CandidateSearch::Levels
        }
    }
}

/// Fingerprints of every texture in a batch, in material then slot order.
#[derive(Debug, Clone, Default)]
pub struct FingerprintIndex {
    entries: Vec<FingerprintEntry>,
}

impl FingerprintIndex {
    pub fn build(materials: &[TextureSet]) -> Self {
        let per_material: Vec<Vec<FingerprintEntry>> = materials
            .par_iter()
            .enumerate()
            .map(|(material_index, set)| {
                let material_name = set.display_name();
                set.iter()
                    .map(|(slot, texture)| FingerprintEntry {
                        material_index,
                        material_name: material_name.clone(),
                        slot,
                        label: set.texture_label(slot),
                        fingerprint: Fingerprint::compute(texture),
                    })
                    .collect()
            })
            .collect();
        let entries: Vec<FingerprintEntry> = per_material.into_iter().flatten().collect();
        tracing::debug!(
            materials = materials.len(),
            textures = entries.len(),
            "Fingerprint index built"
        );
        Self { entries }
    }

    pub fn entries(&self) -> &[FingerprintEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Same-slot pairs from different materials at or above
    /// `similar_threshold`, split at `duplicate_threshold`.
    pub fn find_pairs(
        &self,
        duplicate_threshold: f64,
        similar_threshold: f64,
    ) -> Result<DuplicateAnalysisResult> {
        check_thresholds(duplicate_threshold, similar_threshold)?;
        let max_distance = max_distance(similar_threshold);

        let mut by_slot: BTreeMap<TextureSlot, Vec<usize>> = BTreeMap::new();
        for (i, entry) in self.entries.iter().enumerate() {
            by_slot.entry(entry.slot).or_default().push(i);
        }

        let mut candidates = Vec::new();
        for members in by_slot.values() {
            let fps: Vec<Fingerprint> = members
                .iter()
                .map(|&i| self.entries[i].fingerprint)
                .collect();
            let search = CandidateSearch::for_group(members.len(), max_distance);
            candidates.extend(
                pairs_within(&fps, max_distance, search)
                    .into_iter()
                    .map(|(a, b)| (members[a], members[b])),
            );
        }

        let mut pairs: Vec<DuplicatePair> = candidates
            .par_iter()
            .filter_map(|&(i, j)| {
                let (a, b) = (&self.entries[i], &self.entries[j]);
                if a.material_index == b.material_index {
                    return None;
                }
                let similarity = a.fingerprint.similarity(&b.fingerprint);
                (similarity >= similar_threshold).then(|| make_pair(a, b, similarity))
            })
            .collect();
        pairs.sort_by(|x, y| {
            y.similarity
                .total_cmp(&x.similarity)
                .then_with(|| x.path_a.cmp(&y.path_a))
                .then_with(|| x.path_b.cmp(&y.path_b))
        });

        let (duplicate_pairs, similar_pairs): (Vec<_>, Vec<_>) = pairs
            .into_iter()
            .partition(|p| p.similarity >= duplicate_threshold);
        tracing::debug!(
            duplicates = duplicate_pairs.len(),
            similar = similar_pairs.len(),
            "Duplicate detection finished"
        );
        Ok(DuplicateAnalysisResult {
            duplicate_pairs,
            similar_pairs,
            duplicate_threshold,
            similar_threshold,
        })
    }
}

fn make_pair(a: &FingerprintEntry, b: &FingerprintEntry, similarity: f64) -> DuplicatePair {
    let (a, b) = if a.label <= b.label { (a, b) } else { (b, a) };
    DuplicatePair {
        path_a: a.label.clone(),
        path_b: b.label.clone(),
        slot: a.slot,
        material_a: a.material_name.clone(),
        material_b: b.material_name.clone(),
        similarity,
    }
}

/// Index pairs `(i, j)`, `i < j`, whose Hamming distance is at most
/// `max_distance`. Sorted.
fn pairs_within(
    fps: &[Fingerprint],
    max_distance: u32,
    search: CandidateSearch,
) -> Vec<(usize, usize)> {
    let mut found = match search {
        CandidateSearch::Chunks => chunk_pairs(fps, max_distance),
        CandidateSearch::Levels => level_pairs(fps, max_distance),
        CandidateSearch::Exhaustive => (0..fps.len())
            .into_par_iter()
            .flat_map_iter(move |i| {
                ((i + 1)..fps.len())
                    .filter(move |&j| fps[i].hamming(&fps[j]) <= max_distance)
                    .map(move |j| (i, j))
            })
            .collect(),
    };
    found.sort_unstable();
    found
}

fn chunk_pairs(fps: &[Fingerprint], max_distance: u32) -> Vec<(usize, usize)> {
    let bits = FINGERPRINT_BITS as usize;
    let chunks = max_distance as usize + 1;
    let mut seen = HashSet::new();
    for c in 0..chunks {
        let (start, end) = (c * bits / chunks, (c + 1) * bits / chunks);
        let mut buckets: HashMap<[u64; 4], Vec<usize>> = HashMap::new();
        for (i, fp) in fps.iter().enumerate() {
            buckets.entry(chunk_key(fp, start, end)).or_default().push(i);
        }
        for bucket in buckets.values().filter(|b| b.len() > 1) {
            for (n, &i) in bucket.iter().enumerate() {
                for &j in &bucket[n + 1..] {
                    if fps[i].hamming(&fps[j]) <= max_distance {
                        seen.insert((i, j));
                    }
                }
            }
        }
    }
    seen.into_iter().collect()
}

/// Each fingerprint is compared only against its own popcount level (higher
/// indices) and the `max_distance` levels above it.
fn level_pairs(fps: &[Fingerprint], max_distance: u32) -> Vec<(usize, usize)> {
    let bits = FINGERPRINT_BITS as usize;
    let mut levels: Vec<Vec<usize>> = vec![Vec::new(); bits + 1];
    for (i, fp) in fps.iter().enumerate() {
        levels[fp.popcount() as usize].push(i);
    }
    let levels = &levels;

    fps.par_iter()
        .enumerate()
        .flat_map_iter(move |(i, fp)| {
            let level = fp.popcount() as usize;
            let top = (level + max_distance as usize).min(bits);
            levels[level..=top]
                .iter()
                .enumerate()
                .flat_map(move |(offset, bucket)| {
                    bucket.iter().copied().filter(move |&j| offset > 0 || j > i)
                })
                .filter(move |&j| fp.hamming(&fps[j]) <= max_distance)
                .map(move |j| (i.min(j), i.max(j)))
        })
        .collect()
}

/// Fingerprint with every bit outside `[start, end)` cleared.
fn chunk_key(fp: &Fingerprint, start: usize, end: usize) -> [u64; 4] {
    let mut key = [0u64; 4];
    for (i, word) in fp.0.iter().enumerate() {
        let lo = start.max(i * 64);
        let hi = end.min(i * 64 + 64);
        if lo < hi {
            let width = hi - lo;
            let shift = lo - i * 64;
            let mask = if width == 64 {
                u64::MAX
            } else {
                ((1u64 << width) - 1) << shift
            };
            key[i] = word & mask;
        }
    }
    key
}

/// Detect duplicate or highly similar textures within a set of materials.
/// Compares textures of the same slot (albedo to albedo, etc.) across materials.
pub fn detect_duplicates(
    materials: &[TextureSet],
    duplicate_threshold: f64,
    similar_threshold: f64,
) -> Result<DuplicateAnalysisResult> {
    check_thresholds(duplicate_threshold, similar_threshold)?;
    FingerprintIndex::build(materials).find_pairs(duplicate_threshold, similar_threshold)
}
