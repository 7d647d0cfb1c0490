use std::io::{self, Write};

use serde::Serialize;

use crate::access::DatasetListing;
use crate::access_levels::AccessLevelResponse;
use crate::engine::AlleleResponse;
use crate::filters::FilteringTerm;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    #[default]
    Pretty,
    Compact,
}

pub struct JsonOutput {
    mode: OutputMode,
}

impl JsonOutput {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    pub fn print_response(&self, response: &AlleleResponse) -> io::Result<()> {
        self.print_json(response)
    }

    pub fn print_listing(&self, listing: &DatasetListing) -> io::Result<()> {
        self.print_json(listing)
    }

    pub fn print_terms(&self, terms: &[FilteringTerm]) -> io::Result<()> {
        self.print_json(terms)
    }

    pub fn print_access_levels(&self, levels: &AccessLevelResponse) -> io::Result<()> {
        self.print_json(levels)
    }

    pub fn render<T: Serialize + ?Sized>(&self, value: &T) -> io::Result<String> {
        let json = match self.mode {
            OutputMode::Pretty => serde_json::to_string_pretty(value),
            OutputMode::Compact => serde_json::to_string(value),
        };
        json.map_err(io::Error::other)
    }

    fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> io::Result<()> {
        let json = self.render(value)?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
