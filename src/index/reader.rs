//! Random-access reader over a built index.
//!
//! The reader keeps the dictionary in memory and holds the postings file
//! open. Because it keeps reading the file it opened, a commit that renames
//! new files into place is invisible until [`IndexReader::reset`].

use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{HopdexError, Result};
use crate::hopper::{self, EmptyHopper, Hopper};
use crate::index::cache::PostingCache;
use crate::index::config::ReaderConfig;
use crate::index::dictionary::Dictionary;
use crate::index::manifest::IndexManifest;
use crate::index::{DICTIONARY_FILE, POSTINGS_FILE};
use crate::posting::block::{BlockHeader, HEADER_SIZE};
use crate::posting::{PostingArrays, PostingFactory};
use crate::storage::{Storage, StorageInput};
use crate::types::Feature;

/// Everything a reader derives from the files on disk.
#[derive(Debug)]
struct ReaderState {
    factory: PostingFactory,
    dictionary: Dictionary,
    postings: Box<dyn StorageInput>,
    cache: PostingCache,
}

impl ReaderState {
    fn open(storage: &dyn Storage, config: &ReaderConfig) -> Result<Self> {
        let manifest = IndexManifest::load(storage)?;
        let factory = PostingFactory::from_config(&manifest.config)?;
        let dictionary = Dictionary::load(storage, DICTIONARY_FILE)?;
        let postings = storage.open_input(POSTINGS_FILE)?;

        let size = postings.size()?;
        if size != dictionary.postings_len() {
            return Err(HopdexError::index(format!(
                "postings file has {size} bytes but the dictionary covers {}",
                dictionary.postings_len()
            )));
        }

        Ok(ReaderState {
            factory,
            dictionary,
            postings,
            cache: PostingCache::new(config),
        })
    }

    fn read_range(&mut self, start: u64, len: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; len];
        self.postings.seek(SeekFrom::Start(start))?;
        self.postings.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn load(&mut self, feature: Feature) -> Result<Option<Arc<PostingArrays>>> {
        if let Some(arrays) = self.cache.get(feature) {
            return Ok(Some(arrays));
        }
        let Some((start, end)) = self.dictionary.locate(feature) else {
            return Ok(None);
        };

        let bytes = self.read_range(start, (end - start) as usize)?;
        let (header, arrays) = self.factory.decode_block(&bytes)?;
        check_header(&header, feature, end - start)?;

        let arrays = Arc::new(arrays);
        trace!(feature, intervals = arrays.len(), "loaded posting list");
        self.cache.insert(feature, arrays.clone());
        Ok(Some(arrays))
    }

    fn count(&mut self, feature: Feature) -> Result<u64> {
        if let Some(count) = self.cache.count(feature) {
            return Ok(count);
        }
        let Some((start, end)) = self.dictionary.locate(feature) else {
            return Ok(0);
        };

        let bytes = self.read_range(start, HEADER_SIZE)?;
        let header = BlockHeader::parse(&bytes)?;
        check_header(&header, feature, end - start)?;

        self.cache.record_count(feature, header.n);
        Ok(header.n)
    }
}

fn check_header(header: &BlockHeader, feature: Feature, len: u64) -> Result<()> {
    if header.feature != feature || header.block_len() != len {
        return Err(HopdexError::posting(format!(
            "dictionary entry for {feature} ({len} bytes) points at a block for {} ({} bytes)",
            header.feature,
            header.block_len()
        )));
    }
    Ok(())
}

/// Shared reader over one index directory.
#[derive(Debug)]
pub struct IndexReader {
    storage: Arc<dyn Storage>,
    config: ReaderConfig,
    state: Mutex<ReaderState>,
}

impl IndexReader {
    /// Open the index in `storage`.
    pub fn open(storage: Arc<dyn Storage>, config: ReaderConfig) -> Result<Self> {
        config.validate()?;
        let state = ReaderState::open(storage.as_ref(), &config)?;
        debug!(vocab = state.dictionary.len(), "opened index reader");

        Ok(IndexReader {
            storage,
            config,
            state: Mutex::new(state),
        })
    }

    /// A hopper over the posting list of `feature`. Features not in the
    /// index yield an empty hopper.
    pub fn hopper(&self, feature: Feature) -> Result<Box<dyn Hopper>> {
        let arrays = self.state.lock().load(feature)?;
        Ok(match arrays {
            Some(arrays) => hopper::from_arrays(arrays),
            None => Box::new(EmptyHopper),
        })
    }

    /// Number of intervals in the posting list of `feature`.
    pub fn count(&self, feature: Feature) -> Result<u64> {
        self.state.lock().count(feature)
    }

    /// Number of distinct features in the index.
    pub fn vocab(&self) -> usize {
        self.state.lock().dictionary.len()
    }

    /// Features in ascending order.
    pub fn features(&self) -> Vec<Feature> {
        self.state.lock().dictionary.features().collect()
    }

    /// Re-read the index files and drop every cached list.
    ///
    /// On failure the reader keeps serving its previous view.
    pub fn reset(&self) -> Result<()> {
        let fresh = ReaderState::open(self.storage.as_ref(), &self.config)?;
        let mut state = self.state.lock();
        debug!(
            old_vocab = state.dictionary.len(),
            new_vocab = fresh.dictionary.len(),
            "reset index reader"
        );
        *state = fresh;
        Ok(())
    }

    /// Number of lists currently cached.
    pub fn cached_lists(&self) -> usize {
        self.state.lock().cache.len()
    }
}
