use std::io::{BufRead, Write};

use crate::domain::{Credentials, SearchCriteria, TaxonId};
use crate::error::TaxlenError;

/// Values supplied up front (flags, environment). Anything left `None` is prompted for
/// in interactive mode and is an error otherwise.
#[derive(Debug, Clone, Default)]
pub struct RunInputs {
    pub email: Option<String>,
    pub api_key: Option<String>,
    pub taxid: Option<String>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub credentials: Credentials,
    pub criteria: SearchCriteria,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(inputs: RunInputs) -> Result<ResolvedConfig, TaxlenError> {
        let email = inputs
            .email
            .ok_or_else(|| TaxlenError::MissingInput("email".to_string()))?;
        let taxid = inputs
            .taxid
            .ok_or_else(|| TaxlenError::MissingInput("taxid".to_string()))?;
        let min_length = inputs
            .min_length
            .ok_or_else(|| TaxlenError::MissingInput("min-length".to_string()))?;
        let max_length = inputs
            .max_length
            .ok_or_else(|| TaxlenError::MissingInput("max-length".to_string()))?;
        Self::build(
            email,
            inputs.api_key.unwrap_or_default(),
            &taxid,
            min_length,
            max_length,
        )
    }

    /// Prompts for every missing value, in the order email, API key, taxon id,
    /// minimum length, maximum length.
    pub fn resolve_interactive<R: BufRead, W: Write>(
        inputs: RunInputs,
        input: R,
        output: W,
    ) -> Result<ResolvedConfig, TaxlenError> {
        let mut prompter = Prompter { input, output };
        let email = match inputs.email {
            Some(value) => value,
            None => prompter.ask("NCBI Email", "email")?,
        };
        let api_key = match inputs.api_key {
            Some(value) => value,
            None => prompter.ask_optional("NCBI API Key")?,
        };
        let taxid = match inputs.taxid {
            Some(value) => value,
            None => prompter.ask("TaxID", "taxid")?,
        };
        let min_length = match inputs.min_length {
            Some(value) => value,
            None => prompter.ask_length("Min length", "min-length")?,
        };
        let max_length = match inputs.max_length {
            Some(value) => value,
            None => prompter.ask_length("Max length", "max-length")?,
        };
        Self::build(email, api_key, &taxid, min_length, max_length)
    }

    fn build(
        email: String,
        api_key: String,
        taxid: &str,
        min_length: u64,
        max_length: u64,
    ) -> Result<ResolvedConfig, TaxlenError> {
        if email.trim().is_empty() {
            return Err(TaxlenError::MissingInput("email".to_string()));
        }
        let taxon_id: TaxonId = taxid.parse()?;
        let criteria = SearchCriteria::new(taxon_id, min_length, max_length)?;
        Ok(ResolvedConfig {
            credentials: Credentials::new(email.trim(), api_key.trim()),
            criteria,
        })
    }
}

struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    fn read_line(&mut self, label: &str) -> Result<Option<String>, TaxlenError> {
        write!(self.output, "{label}: ")
            .and_then(|_| self.output.flush())
            .map_err(|err| TaxlenError::io("stdout", err))?;
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .map_err(|err| TaxlenError::io("stdin", err))?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn ask(&mut self, label: &str, field: &str) -> Result<String, TaxlenError> {
        match self.read_line(label)? {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(TaxlenError::MissingInput(field.to_string())),
        }
    }

    fn ask_optional(&mut self, label: &str) -> Result<String, TaxlenError> {
        Ok(self.read_line(label)?.unwrap_or_default())
    }

    fn ask_length(&mut self, label: &str, field: &str) -> Result<u64, TaxlenError> {
        let value = self.ask(label, field)?;
        value.parse::<u64>().map_err(|_| TaxlenError::InvalidInput {
            field: field.to_string(),
            value,
        })
    }
}
