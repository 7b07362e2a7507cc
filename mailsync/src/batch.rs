//! # Batch
//!
//! Module dedicated to the partitioning of a folder into batches of
//! messages. Message positions start from 1, a batch covers a
//! contiguous range of positions and is processed by one worker task.

use std::fmt;

/// The default number of messages per batch.
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// A range of message positions, both bounds inclusive.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Batch {
    pub start: usize,
    pub end: usize,

    /// Whether this is the last batch of the folder.
    pub last: bool,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// Split `[1, count]` into batches of at most `size` messages.
///
/// Returns `ceil(count / size)` batches that do not overlap, the last
/// one covering the remainder. An empty folder gives no batch at all.
pub fn batches(count: usize, size: usize) -> Vec<Batch> {
    let size = size.max(1);

    (1..=count)
        .step_by(size)
        .map(|start| {
            let end = (start - 1).saturating_add(size).min(count);
            Batch {
                start,
                end,
                last: end == count,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{batches, Batch};

    #[test]
    fn empty_folder_has_no_batch() {
        assert!(batches(0, 200).is_empty());
    }

    #[test]
    fn remainder_goes_to_an_undersized_last_batch() {
        assert_eq!(
            batches(450, 200),
            vec![
                Batch {
                    start: 1,
                    end: 200,
                    last: false,
                },
                Batch {
                    start: 201,
                    end: 400,
                    last: false,
                },
                Batch {
                    start: 401,
                    end: 450,
                    last: true,
                },
            ]
        );
    }

    #[test]
    fn huge_batch_size_gives_one_batch() {
        assert_eq!(
            batches(3, usize::MAX),
            vec![Batch {
                start: 1,
                end: 3,
                last: true,
            }]
        );
    }

    #[test]
    fn batches_cover_every_position_once() {
        for (count, size) in [(1, 200), (199, 200), (200, 200), (201, 200), (1000, 7), (13, 1)] {
            let batches = batches(count, size);
            assert_eq!(batches.len(), (count + size - 1) / size);

            let positions: Vec<usize> = batches.iter().flat_map(|b| b.start..=b.end).collect();
            assert_eq!(positions, (1..=count).collect::<Vec<_>>());

            assert!(batches.iter().rev().skip(1).all(|b| !b.last));
            assert!(batches.last().unwrap().last);
        }
    }
}
