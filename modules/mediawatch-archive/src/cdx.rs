use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{ArchiveError, Result};

/// Timestamp layout used throughout the CDX API.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const DATE_FORMAT: &str = "%Y%m%d";

pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map_err(|_| ArchiveError::CdxFormat(format!("bad timestamp '{s}'")))
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// One line of a CDX search response: seven whitespace-separated fields.
/// Anything that deviates from that format fails closed.
#[derive(Debug, Clone, PartialEq)]
pub struct CdxRecord {
    pub urlkey: String,
    pub timestamp: NaiveDateTime,
    pub original: String,
    pub mimetype: String,
    pub statuscode: u16,
    pub digest: String,
    pub length: u64,
}

impl CdxRecord {
    pub fn parse_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [urlkey, timestamp, original, mimetype, statuscode, digest, length] = fields[..]
        else {
            return Err(ArchiveError::CdxFormat(format!(
                "expected 7 fields, got {} in '{line}'",
                fields.len()
            )));
        };

        Ok(Self {
            urlkey: urlkey.to_string(),
            timestamp: parse_timestamp(timestamp)?,
            original: original.to_string(),
            mimetype: mimetype.to_string(),
            statuscode: statuscode
                .parse()
                .map_err(|_| ArchiveError::CdxFormat(format!("bad statuscode '{statuscode}'")))?,
            digest: digest.to_string(),
            length: length
                .parse()
                .map_err(|_| ArchiveError::CdxFormat(format!("bad length '{length}'")))?,
        })
    }

    /// Re-emit the record in the wire format. `parse_line` of the result
    /// yields the same record.
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {} {} {} {}",
            self.urlkey,
            format_timestamp(&self.timestamp),
            self.original,
            self.mimetype,
            self.statuscode,
            self.digest,
            self.length
        )
    }
}

/// A `from`/`to` bound: date-only encodes as YYYYMMDD, date+time as
/// YYYYMMDDhhmmss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CdxTime {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl CdxTime {
    pub fn to_param(self) -> String {
        match self {
            CdxTime::Date(d) => d.format(DATE_FORMAT).to_string(),
            CdxTime::DateTime(dt) => format_timestamp(&dt),
        }
    }
}

/// Query against the CDX search endpoint.
#[derive(Debug, Clone, Default)]
pub struct CdxRequest {
    pub url: String,
    pub filter: Option<String>,
    pub from: Option<CdxTime>,
    pub to: Option<CdxTime>,
    pub limit: Option<u32>,
}

impl CdxRequest {
    pub fn into_params(self) -> Vec<(&'static str, String)> {
        let mut params = vec![("url", self.url)];
        if let Some(filter) = self.filter {
            params.push(("filter", filter));
        }
        if let Some(from) = self.from {
            params.push(("from", from.to_param()));
        }
        if let Some(to) = self.to {
            params.push(("to", to.to_param()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        params
    }
}
