use async_trait::async_trait;

use super::{CorpusRow, CorpusSource};

/// Corpus held in memory, paged in insertion order
///
/// Useful for embedding the ranker in tools that already hold their vectors
/// and for exercising the ranking pipeline without a database.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCorpus {
    rows: Vec<CorpusRow>,
}

impl InMemoryCorpus {
    #[inline]
    pub fn new(rows: Vec<CorpusRow>) -> Self {
        Self { rows }
    }

    #[inline]
    pub fn push(&mut self, row: CorpusRow) {
        self.rows.push(row);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl FromIterator<CorpusRow> for InMemoryCorpus {
    #[inline]
    fn from_iter<T: IntoIterator<Item = CorpusRow>>(iter: T) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl CorpusSource for InMemoryCorpus {
    #[inline]
    async fn fetch_page(&self, offset: usize, limit: usize) -> anyhow::Result<Vec<CorpusRow>> {
        Ok(self
            .rows
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    #[inline]
    async fn count(&self) -> anyhow::Result<Option<u64>> {
        Ok(Some(self.rows.len() as u64))
    }
}
