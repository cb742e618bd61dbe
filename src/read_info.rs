
/// One piece of read evidence on an edge: which read traverses it and at
/// which read offset, with the base quality at that offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadInfoEntry {
    pub read_index: usize,
    pub read_position: usize,
    pub quality: u8
}

/// Sparse, sorted set of read evidence attached to an edge. Entries are
/// unique per (read_index, read_position) and kept ordered so the set
/// algebra below runs as linear merges.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadInfo {
    entries: Vec<ReadInfoEntry>
}

impl ReadInfo {
    pub fn new() -> ReadInfo {
        ReadInfo {
            entries: vec![]
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ReadInfoEntry] {
        &self.entries
    }

    /// Adds one entry, keeping the set sorted and deduplicated.
    pub fn add(&mut self, read_index: usize, read_position: usize, quality: u8) {
        let entry = ReadInfoEntry { read_index, read_position, quality };
        let position = self.entries
            .binary_search_by_key(&(read_index, read_position), |e| (e.read_index, e.read_position));
        match position {
            Ok(_) => {},
            Err(insert_at) => {
                self.entries.insert(insert_at, entry);
            }
        };
    }

    /// Distinct read indices covering this edge.
    pub fn read_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.entries.iter()
            .map(|e| e.read_index)
            .collect();
        indices.dedup();
        indices
    }

    /// Intersection by read index, constrained so the matched entries are
    /// `read_distance` apart on the read (`pos1 + read_distance == pos2`);
    /// a distance of 0 disables the position constraint. A read can leave
    /// several entries on one edge, so equal-index runs are compared pair
    /// by pair. Returns the matched entries from `self`.
    pub fn intersect(&self, other: &ReadInfo, read_distance: usize) -> Vec<ReadInfoEntry> {
        let mut result: Vec<ReadInfoEntry> = vec![];
        let mut i = 0;
        let mut j = 0;
        while i < self.entries.len() && j < other.entries.len() {
            let index1 = self.entries[i].read_index;
            let index2 = other.entries[j].read_index;
            if index1 == index2 {
                let i_end = self.run_end(i);
                let j_end = other.run_end(j);
                for e1 in self.entries[i..i_end].iter() {
                    let matched = other.entries[j..j_end].iter().any(|e2| {
                        e1.read_position <= e2.read_position &&
                            (read_distance == 0 || e1.read_position + read_distance == e2.read_position)
                    });
                    if matched {
                        result.push(*e1);
                    }
                }
                i = i_end;
                j = j_end;
            } else if index1 < index2 {
                i += 1;
            } else {
                j += 1;
            }
        }
        result
    }

    /// End of the run of entries sharing `entries[start]`'s read index.
    fn run_end(&self, start: usize) -> usize {
        let index = self.entries[start].read_index;
        let mut end = start + 1;
        while end < self.entries.len() && self.entries[end].read_index == index {
            end += 1;
        }
        end
    }

    /// Removes every entry whose read index appears in `subtrahend`,
    /// including every member of an equal-index run.
    pub fn subtract(&mut self, subtrahend: &[ReadInfoEntry]) {
        let mut difference: Vec<ReadInfoEntry> = vec![];
        let mut i = 0;
        let mut j = 0;
        while i < self.entries.len() && j < subtrahend.len() {
            let e1 = &self.entries[i];
            let e2 = &subtrahend[j];
            if e1.read_index == e2.read_index {
                i += 1;
            } else if e1.read_index < e2.read_index {
                difference.push(*e1);
                i += 1;
            } else {
                j += 1;
            }
        }
        difference.extend_from_slice(&self.entries[i..]);
        self.entries = difference;
    }

    /// Merges another set into this one.
    pub fn merge(&mut self, other: &ReadInfo) {
        for entry in other.entries.iter() {
            self.add(entry.read_index, entry.read_position, entry.quality);
        }
    }
}
