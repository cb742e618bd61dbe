
use crate::data_types::variants::{PhaseType, VariantCall};

use log::{debug, trace};

/// Knobs for the two-haplotype phaser.
#[derive(Clone, Debug)]
pub struct PhaserOptions {
    /// Minimum shared reads for an edge between consecutive variant sites.
    pub edge_threshold: usize,
    /// Minimum shared reads for an edge between non-consecutive sites.
    pub paired_threshold: usize,
    /// Recoloring attempts after relaxing conflicting paired edges.
    pub max_recolor_attempts: usize,
    /// A call with a REF allele at least this long is invalidated.
    pub max_ref_len: usize
}

impl Default for PhaserOptions {
    fn default() -> Self {
        PhaserOptions {
            edge_threshold: 1,
            paired_threshold: 2,
            max_recolor_attempts: 8,
            max_ref_len: 40
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Color {
    Uncolored,
    Hap1,
    Hap2,
    /// Pre-colored: the allele sits on both haplotypes.
    Both
}

impl Color {
    fn opposite(self) -> Color {
        match self {
            Color::Hap1 => Color::Hap2,
            Color::Hap2 => Color::Hap1,
            other => other
        }
    }
}

/// A same-haplotype constraint between two allele vertices.
struct Link {
    target: usize,
    /// Links from non-consecutive sites may be relaxed on a coloring
    /// conflict; links between consecutive sites may not.
    paired: bool,
    removed: bool
}

/// One allele of one variant. Vertex `2*slot` is the reference allele of
/// the variant in phasing slot `slot`, `2*slot + 1` its alternate; the
/// two are counterparts and must land on opposite haplotypes.
struct PhaseVertex {
    reads: Vec<usize>,
    links: Vec<Link>,
    color: Color
}

/// Size of the intersection of two sorted read-index sets.
fn shared_reads(a: &[usize], b: &[usize]) -> usize {
    let mut count = 0;
    let mut i = 0;
    let mut j = 0;
    while i < a.len() && j < b.len() {
        if a[i] == b[j] {
            count += 1;
            i += 1;
            j += 1;
        } else if a[i] < b[j] {
            i += 1;
        } else {
            j += 1;
        }
    }
    count
}

fn add_link(vertices: &mut [PhaseVertex], a: usize, b: usize, paired: bool) {
    vertices[a].links.push(Link { target: b, paired, removed: false });
    vertices[b].links.push(Link { target: a, paired, removed: false });
}

/// Marks a link removed in both directions; returns whether a live link
/// was actually removed.
fn remove_link(vertices: &mut [PhaseVertex], a: usize, b: usize) -> bool {
    let mut removed = false;
    for link in vertices[a].links.iter_mut() {
        if link.target == b && !link.removed {
            link.removed = true;
            removed = true;
        }
    }
    for link in vertices[b].links.iter_mut() {
        if link.target == a && !link.removed {
            link.removed = true;
        }
    }
    removed
}

/// Propagates colors through one component from a worklist. The first
/// conflicting constraint is reported as (vertex, neighbor, paired).
fn try_color(vertices: &mut [PhaseVertex], members: &[usize]) -> Result<(), (usize, usize, bool)> {
    for &m in members.iter() {
        if vertices[m].color != Color::Both {
            vertices[m].color = Color::Uncolored;
        }
    }
    loop {
        let seed = members.iter()
            .copied()
            .find(|&m| vertices[m].color == Color::Uncolored);
        let seed = match seed {
            Some(seed) => seed,
            None => {
                return Ok(());
            }
        };
        vertices[seed].color = Color::Hap1;
        let mut stack: Vec<usize> = vec![seed];
        while let Some(v) = stack.pop() {
            let color = vertices[v].color;
            let counterpart = v ^ 1;
            match vertices[counterpart].color {
                Color::Uncolored => {
                    vertices[counterpart].color = color.opposite();
                    stack.push(counterpart);
                },
                Color::Both => {},
                c => {
                    if c == color {
                        return Err((v, counterpart, false));
                    }
                }
            };
            let links: Vec<(usize, bool)> = vertices[v].links.iter()
                .filter(|link| !link.removed)
                .map(|link| (link.target, link.paired))
                .collect();
            for (target, paired) in links.into_iter() {
                match vertices[target].color {
                    Color::Uncolored => {
                        vertices[target].color = color;
                        stack.push(target);
                    },
                    Color::Both => {},
                    c => {
                        if c != color {
                            return Err((v, target, paired));
                        }
                    }
                };
            }
        }
    }
}

/// Colors one component, relaxing conflicting paired links and retrying.
/// Returns false when the component cannot be colored; colors are then
/// reset so the component stays unphased.
fn color_component(vertices: &mut [PhaseVertex], members: &[usize], max_attempts: usize) -> bool {
    for _attempt in 0..max_attempts {
        let conflict = match try_color(vertices, members) {
            Ok(()) => {
                return true;
            },
            Err(conflict) => conflict
        };
        let (a, b, paired) = conflict;
        let mut removed = false;
        if paired {
            removed = remove_link(vertices, a, b);
        } else {
            // the offending constraint is rigid; relax the paired links
            // touching either endpoint or their counterparts instead
            for &v in [a, b, a ^ 1, b ^ 1].iter() {
                let targets: Vec<usize> = vertices[v].links.iter()
                    .filter(|link| link.paired && !link.removed)
                    .map(|link| link.target)
                    .collect();
                for target in targets.into_iter() {
                    removed |= remove_link(vertices, v, target);
                }
            }
        }
        if !removed {
            break;
        }
        trace!("Coloring conflict between vertices {} and {}, relaxed paired links and retrying", a, b);
    }
    debug!("{}, leaving the component unphased", crate::errors::GraphError::CannotColor);
    for &m in members.iter() {
        if vertices[m].color != Color::Both {
            vertices[m].color = Color::Uncolored;
        }
    }
    false
}

/// Phases heterozygous calls onto two haplotypes. `variants` must be
/// sorted by chromosome and position. Calls in a colorable component get
/// a shared phase group anchored at the component's first position;
/// everything else stays unphased.
pub fn phase_variants(variants: &mut [VariantCall], options: &PhaserOptions) {
    for variant in variants.iter_mut() {
        if variant.ref_allele().len() >= options.max_ref_len {
            variant.invalidate();
        }
    }
    let usable: Vec<usize> = variants.iter()
        .enumerate()
        .filter(|(_, v)| v.is_valid())
        .map(|(i, _)| i)
        .collect();
    if usable.is_empty() {
        return;
    }

    // two vertices per variant: reference allele, then alternate
    let mut vertices: Vec<PhaseVertex> = Vec::with_capacity(usable.len() * 2);
    for &vi in usable.iter() {
        vertices.push(PhaseVertex {
            reads: variants[vi].ref_reads().to_vec(),
            links: vec![],
            color: Color::Uncolored
        });
        vertices.push(PhaseVertex {
            reads: variants[vi].alt_reads().to_vec(),
            links: vec![],
            color: Color::Uncolored
        });
    }

    for s1 in 0..usable.len() {
        for s2 in (s1 + 1)..usable.len() {
            if variants[usable[s1]].chrom() != variants[usable[s2]].chrom() {
                continue;
            }
            let consecutive = s2 == s1 + 1;
            let threshold = if consecutive { options.edge_threshold } else { options.paired_threshold };
            for a_off in 0..2 {
                for b_off in 0..2 {
                    let a = 2 * s1 + a_off;
                    let b = 2 * s2 + b_off;
                    if shared_reads(&vertices[a].reads, &vertices[b].reads) >= threshold {
                        add_link(&mut vertices, a, b, !consecutive);
                    }
                }
            }
        }
    }

    // an alternate with no reference-supporting reads has no opposite
    // allele to discriminate against; it sits on both haplotypes
    for slot in 0..usable.len() {
        if vertices[2 * slot].reads.is_empty() && !vertices[2 * slot + 1].reads.is_empty() {
            vertices[2 * slot].color = Color::Both;
            vertices[2 * slot + 1].color = Color::Both;
        }
    }

    // connected components over links plus counterpart pairs
    let mut component_of: Vec<Option<usize>> = vec![None; vertices.len()];
    let mut components: Vec<Vec<usize>> = vec![];
    for v in 0..vertices.len() {
        if component_of[v].is_some() {
            continue;
        }
        let id = components.len();
        let mut members: Vec<usize> = vec![];
        let mut stack: Vec<usize> = vec![v];
        component_of[v] = Some(id);
        while let Some(m) = stack.pop() {
            members.push(m);
            let mut neighbors: Vec<usize> = vec![m ^ 1];
            neighbors.extend(vertices[m].links.iter().map(|link| link.target));
            for n in neighbors.into_iter() {
                if component_of[n].is_none() {
                    component_of[n] = Some(id);
                    stack.push(n);
                }
            }
        }
        members.sort_unstable();
        components.push(members);
    }

    for members in components.iter() {
        let mut slots: Vec<usize> = members.iter().map(|&m| m / 2).collect();
        slots.dedup();
        let colored = slots.len() >= 2 &&
            color_component(&mut vertices, members, options.max_recolor_attempts);
        if colored {
            let group = variants[usable[slots[0]]].position();
            for &slot in slots.iter() {
                let phase_type = match vertices[2 * slot + 1].color {
                    Color::Hap1 => PhaseType::TwoOne,
                    Color::Hap2 => PhaseType::OneTwo,
                    Color::Both => PhaseType::BothAlt,
                    Color::Uncolored => {
                        continue;
                    }
                };
                variants[usable[slot]].set_phase(group, phase_type);
            }
        } else {
            for &slot in slots.iter() {
                if vertices[2 * slot + 1].color == Color::Both {
                    let position = variants[usable[slot]].position();
                    variants[usable[slot]].set_phase(position, PhaseType::BothAlt);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(chrom: &str, position: u64, ref_reads: Vec<usize>, alt_reads: Vec<usize>) -> VariantCall {
        VariantCall::new(
            chrom.to_string(), position,
            b"A".to_vec(), b"C".to_vec(), 60,
            ref_reads.len() as u64, alt_reads.len() as u64,
            ref_reads, alt_reads
        )
    }

    #[test]
    fn test_cis_pair_shares_phase() {
        let mut variants = vec![
            call("chr1", 100, vec![0, 1], vec![2, 3]),
            call("chr1", 150, vec![0, 1], vec![2, 3])
        ];
        phase_variants(&mut variants, &PhaserOptions::default());
        assert_eq!(variants[0].phase_type(), PhaseType::OneTwo);
        assert_eq!(variants[1].phase_type(), PhaseType::OneTwo);
        assert_eq!(variants[0].phase_group(), Some(100));
        assert_eq!(variants[1].phase_group(), Some(100));
    }

    #[test]
    fn test_trans_pair_gets_opposite_phase() {
        let mut variants = vec![
            call("chr1", 100, vec![0, 1], vec![2, 3]),
            call("chr1", 150, vec![2, 3], vec![0, 1])
        ];
        phase_variants(&mut variants, &PhaserOptions::default());
        assert_eq!(variants[0].phase_type(), PhaseType::OneTwo);
        assert_eq!(variants[1].phase_type(), PhaseType::TwoOne);
        assert_eq!(variants[0].phase_group(), Some(100));
        assert_eq!(variants[1].phase_group(), Some(100));
    }

    #[test]
    fn test_conflicting_paired_link_is_relaxed() {
        // the consecutive chain says cis throughout, the long-range link
        // between the first and third sites disagrees and must give way
        let mut variants = vec![
            call("chr1", 100, vec![0, 8, 9], vec![2]),
            call("chr1", 150, vec![0, 1], vec![2]),
            call("chr1", 200, vec![1], vec![8, 9])
        ];
        phase_variants(&mut variants, &PhaserOptions::default());
        assert_eq!(variants[0].phase_type(), PhaseType::OneTwo);
        assert_eq!(variants[1].phase_type(), PhaseType::OneTwo);
        assert_eq!(variants[2].phase_type(), PhaseType::OneTwo);
        assert_eq!(variants[2].phase_group(), Some(100));
    }

    #[test]
    fn test_homozygous_alt_pre_color() {
        let mut variants = vec![
            call("chr1", 100, vec![], vec![2, 3])
        ];
        phase_variants(&mut variants, &PhaserOptions::default());
        assert_eq!(variants[0].phase_type(), PhaseType::BothAlt);
        assert_eq!(variants[0].phase_group(), Some(100));
    }

    #[test]
    fn test_isolated_het_stays_unphased() {
        let mut variants = vec![
            call("chr1", 100, vec![0, 1], vec![2, 3])
        ];
        phase_variants(&mut variants, &PhaserOptions::default());
        assert_eq!(variants[0].phase_type(), PhaseType::None);
        assert_eq!(variants[0].phase_group(), None);
    }

    #[test]
    fn test_chromosomes_are_independent() {
        let mut variants = vec![
            call("chr1", 100, vec![0, 1], vec![2, 3]),
            call("chr2", 100, vec![0, 1], vec![2, 3])
        ];
        phase_variants(&mut variants, &PhaserOptions::default());
        assert_eq!(variants[0].phase_type(), PhaseType::None);
        assert_eq!(variants[1].phase_type(), PhaseType::None);
    }

    #[test]
    fn test_long_ref_invalidated() {
        let mut variants = vec![
            call("chr1", 100, vec![0, 1], vec![2, 3]),
            VariantCall::new(
                "chr1".to_string(), 150,
                vec![b'A'; 40], b"C".to_vec(), 60,
                2, 2, vec![0, 1], vec![2, 3]
            )
        ];
        phase_variants(&mut variants, &PhaserOptions::default());
        assert!(!variants[1].is_valid());
        // its partner loses the only link and stays unphased
        assert_eq!(variants[0].phase_type(), PhaseType::None);
    }
}
