use super::Track;
use crate::block::{Block, Columns, FeatureRef};
use crate::error::Result;
use crate::index::BlockKey;
use crate::Coord;
use std::sync::Arc;

/// Lending cursor over the features of a track.
///
/// Holds at most one loaded block and walks the index lazily. The view returned by [`advance`] borrows
/// the cursor, so it cannot be kept across the next call; copy out what you
/// need or use [`FeatureRef::to_feature`].
///
/// [`advance`]: FeatureCursor::advance
pub struct FeatureCursor<'t, C: Columns> {
    track: &'t Track<C>,
    keys: Box<dyn Iterator<Item = &'t BlockKey> + 't>,
    /// Half-open query window, `None` for a full scan
    window: Option<(Coord, Coord)>,
    block: Option<Arc<Block<C>>>,
    row: usize,
    stop: usize,
}

impl<'t, C: Columns> FeatureCursor<'t, C> {
    pub(super) fn new(
        track: &'t Track<C>,
        keys: impl Iterator<Item = &'t BlockKey> + 't,
        window: Option<(Coord, Coord)>,
    ) -> Self {
        Self {
            track,
            keys: Box::new(keys),
            window,
            block: None,
            row: 0,
            stop: 0,
        }
    }

    /// Move to the next feature. A block that cannot be loaded is an error,
    /// never an early end.
    pub fn advance(&mut self) -> Result<Option<FeatureRef<'_, C>>> {
        let row = loop {
            if let Some(row) = self.next_row() {
                break row;
            }
            if !self.load_next_block()? {
                return Ok(None);
            }
        };
        Ok(self.block.as_ref().map(|block| block.feature(row)))
    }

    fn next_row(&mut self) -> Option<usize> {
        let block = self.block.as_ref()?;
        while self.row < self.stop {
            let row = self.row;
            self.row += 1;
            if let Some((start, _)) = self.window {
                if block.columns().end(row) < start {
                    continue;
                }
            }
            return Some(row);
        }
        None
    }

    fn load_next_block(&mut self) -> Result<bool> {
        self.block = None;
        for key in self.keys.by_ref() {
            if key.is_empty() {
                continue;
            }
            let block = self.track.load(key)?;
            self.row = 0;
            self.stop = match self.window {
                Some((_, end)) => block.window(end).end,
                None => block.len(),
            };
            self.block = Some(block);
            return Ok(true);
        }
        Ok(false)
    }

    /// Visit every remaining feature
    pub fn for_each(mut self, mut visit: impl FnMut(FeatureRef<'_, C>)) -> Result<()> {
        while let Some(feature) = self.advance()? {
            visit(feature);
        }
        Ok(())
    }

    pub fn count(mut self) -> Result<usize> {
        let mut count = 0;
        while self.advance()?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    /// Copy every remaining feature out
    pub fn collect_owned(mut self) -> Result<Vec<C::Owned>> {
        let mut features = Vec::new();
        while let Some(feature) = self.advance()? {
            features.push(feature.to_feature());
        }
        Ok(features)
    }
}
