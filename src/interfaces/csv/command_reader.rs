use crate::error::{Result, StorefrontError};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Create,
    Confirm,
    Cancel,
    Retry,
}

/// One row of an administrator command file.
///
/// For `create`, `actor` is the purchaser and `target` the product.
/// For the other commands, `actor` is the administrator and `target` the order.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct AdminCommand {
    pub r#type: CommandType,
    pub actor: u64,
    pub target: u64,
    pub variation: Option<u64>,
}

/// Reads admin commands from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths, so the
/// optional `variation` column may be left off entirely.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    /// Creates a new `CommandReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes commands.
    pub fn commands(self) -> impl Iterator<Item = Result<AdminCommand>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(StorefrontError::from))
    }
}
