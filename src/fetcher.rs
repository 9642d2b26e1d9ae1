use std::io::Read;

use gb_io::reader::{GbParserError, SeqReader};
use gb_io::seq::Seq;

use crate::domain::{MAX_RECORDS, NUCLEOTIDE_DB, SearchCriteria, SequenceRecord};
use crate::error::TaxlenError;
use crate::ncbi::EntrezClient;

/// Searches the taxon, bulk-fetches up to [`MAX_RECORDS`] GenBank records from the
/// search history and keeps those whose length passes the criteria, in retrieval order.
pub fn fetch_records<C: EntrezClient + ?Sized>(
    client: &C,
    criteria: &SearchCriteria,
) -> Result<Vec<SequenceRecord>, TaxlenError> {
    let term = criteria.taxon_id().organism_term();
    let history = client.search(NUCLEOTIDE_DB, &term)?;
    tracing::info!(taxon = %criteria.taxon_id(), count = history.count, "search matched");
    if history.count > u64::from(MAX_RECORDS) {
        tracing::warn!(
            count = history.count,
            limit = MAX_RECORDS,
            "only the first {MAX_RECORDS} records are fetched"
        );
    }

    let body = client.bulk_fetch(NUCLEOTIDE_DB, &history, MAX_RECORDS)?;
    parse_records(body, criteria)
}

pub fn parse_records<R: Read>(
    reader: R,
    criteria: &SearchCriteria,
) -> Result<Vec<SequenceRecord>, TaxlenError> {
    let mut kept = Vec::new();
    let mut seen = 0usize;
    for seq in SeqReader::new(reader) {
        let seq = seq.map_err(read_error)?;
        seen += 1;
        let record = to_sequence_record(&seq)?;
        if criteria.accepts(record.length) {
            kept.push(record);
        }
    }
    tracing::info!(parsed = seen, kept = kept.len(), "records filtered");
    Ok(kept)
}

/// The body is read straight off the response, so I/O failures are transport failures.
fn read_error(err: GbParserError) -> TaxlenError {
    match err {
        GbParserError::Io(err) => TaxlenError::NcbiHttp(format!("reading efetch body: {err}")),
        other => TaxlenError::Parse(other.to_string()),
    }
}

fn to_sequence_record(seq: &Seq) -> Result<SequenceRecord, TaxlenError> {
    let accession = record_id(seq)
        .ok_or_else(|| TaxlenError::Parse("record without LOCUS, ACCESSION or VERSION".to_string()))?;

    let length = if seq.seq.is_empty() {
        seq.len.unwrap_or(0) as u64
    } else {
        seq.seq.len() as u64
    };
    if length == 0 {
        return Err(TaxlenError::Parse(format!("record {accession} has no sequence")));
    }

    let description = seq
        .definition
        .as_deref()
        .map(|text| {
            let text = text.trim();
            text.strip_suffix('.').unwrap_or(text).to_string()
        })
        .unwrap_or_default();

    Ok(SequenceRecord {
        accession,
        length,
        description,
    })
}

/// `accession.version` when present, then the primary accession, then the LOCUS name.
fn record_id(seq: &Seq) -> Option<String> {
    [&seq.version, &seq.accession, &seq.name]
        .into_iter()
        .filter_map(|field| field.as_deref())
        .filter_map(|value| value.split_whitespace().next())
        .map(str::to_string)
        .next()
}
