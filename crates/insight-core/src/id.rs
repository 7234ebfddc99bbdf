//! Strongly-typed identifiers for deployment blocks and chunks.
//!
//! Both identifiers are rendered into blob paths and document fields:
//! - a block id is `block_<YEAR>` where the year is the UTC calendar year
//! - a chunk id is `chunk_<INDEX>` where the index is 0-based within its block
//!
//! # Example
//!
//! ```rust
//! use insight_core::id::{BlockId, ChunkId};
//!
//! let block = BlockId::for_year(2023);
//! assert_eq!(block.to_string(), "block_2023");
//! assert_eq!("chunk_4".parse::<ChunkId>().unwrap().index(), 4);
//! ```

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

const BLOCK_PREFIX: &str = "block_";
const CHUNK_PREFIX: &str = "chunk_";

/// Converts unix seconds to a UTC datetime.
///
/// # Errors
///
/// Returns `Error::InvalidInput` if the timestamp is outside chrono's range.
pub fn utc_from_unix(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| Error::InvalidInput(format!("timestamp {ts} is out of range")))
}

/// Identifier of a one-calendar-year partition of a project's deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlockId(i32);

impl BlockId {
    /// Creates the block id for the given UTC year.
    #[must_use]
    pub const fn for_year(year: i32) -> Self {
        Self(year)
    }

    /// Creates the block id enclosing the given unix timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the timestamp is outside the representable range.
    pub fn for_timestamp(ts: i64) -> Result<Self> {
        Ok(Self(utc_from_unix(ts)?.year()))
    }

    /// Returns the UTC year this block covers.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{BLOCK_PREFIX}{}", self.0)
    }
}

impl FromStr for BlockId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.strip_prefix(BLOCK_PREFIX)
            .and_then(|year| year.parse::<i32>().ok())
            .map(Self)
            .ok_or_else(|| Error::InvalidId {
                message: format!("invalid block id: {s}"),
            })
    }
}

impl TryFrom<String> for BlockId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BlockId> for String {
    fn from(value: BlockId) -> Self {
        value.to_string()
    }
}

/// Identifier of a size-bounded chunk inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChunkId(usize);

impl ChunkId {
    /// Creates the chunk id for the given 0-based index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the 0-based index encoded in this id.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CHUNK_PREFIX}{}", self.0)
    }
}

impl FromStr for ChunkId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.strip_prefix(CHUNK_PREFIX)
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse::<usize>().ok())
            .map(Self)
            .ok_or_else(|| Error::InvalidId {
                message: format!("invalid chunk id: {s}"),
            })
    }
}

impl TryFrom<String> for ChunkId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ChunkId> for String {
    fn from(value: ChunkId) -> Self {
        value.to_string()
    }
}
