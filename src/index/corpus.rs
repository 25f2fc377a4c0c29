//! JSONL corpus of court decisions split into sections

use crate::error::{LakihakuError, Result};
use crate::retrieval::ChunkPayload;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;

/// One decision or statute, one JSON object per corpus line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusDocument {
    pub document_id: String,
    #[serde(default)]
    pub case_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub court: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub legal_domains: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub tenant: Option<String>,
    /// Headnote / ratkaisun pääkohdat
    #[serde(default)]
    pub holdings: Vec<String>,
    #[serde(default)]
    pub cited_laws: Vec<String>,
    pub sections: Vec<CorpusSection>,
}

/// A retrievable sub-document unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusSection {
    pub id: String,
    #[serde(default)]
    pub section_type: Option<String>,
    #[serde(default)]
    pub section_title: Option<String>,
    pub text: String,
    /// Precomputed embedding; computed at index time when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl CorpusDocument {
    /// Payload for one section of this document
    pub fn payload(&self, section: &CorpusSection, position: usize) -> ChunkPayload {
        ChunkPayload {
            text: section.text.clone(),
            title: self.title.clone(),
            court: self.court.as_ref().map(|c| c.to_uppercase()),
            year: self.year,
            case_id: self.case_id.as_ref().map(|c| c.to_uppercase()),
            section_type: section.section_type.clone(),
            section_title: section.section_title.clone(),
            url: self.url.clone(),
            legal_domains: self.legal_domains.iter().map(|d| d.to_lowercase()).collect(),
            tenant: self.tenant.clone(),
            position,
        }
    }

    /// Bibliographic text searched by the metadata index
    pub fn metadata_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(case_id) = &self.case_id {
            parts.push(case_id);
        }
        if let Some(court) = &self.court {
            parts.push(court);
        }
        parts.push(&self.title);
        parts.extend(self.holdings.iter().map(String::as_str));
        parts.extend(self.cited_laws.iter().map(String::as_str));
        parts.extend(self.legal_domains.iter().map(String::as_str));
        parts.join(" \n")
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.document_id.trim().is_empty() {
            return Err("document_id cannot be empty".to_string());
        }
        if self.sections.is_empty() {
            return Err(format!("document {} has no sections", self.document_id));
        }
        for section in &self.sections {
            if section.id.trim().is_empty() {
                return Err(format!(
                    "document {} has a section without an id",
                    self.document_id
                ));
            }
        }
        Ok(())
    }
}

/// Parse a JSONL corpus; blank lines are skipped
///
/// Section ids must be unique across the whole corpus.
pub fn parse_corpus<R: BufRead>(reader: R) -> Result<Vec<CorpusDocument>> {
    let mut documents = Vec::new();
    let mut section_ids: HashSet<String> = HashSet::new();

    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line.map_err(|e| LakihakuError::Io {
            source: e,
            context: format!("Failed to read corpus line {}", line_number),
        })?;

        if line.trim().is_empty() {
            continue;
        }

        let document: CorpusDocument =
            serde_json::from_str(&line).map_err(|e| LakihakuError::Corpus {
                line: line_number,
                message: e.to_string(),
            })?;

        document.validate().map_err(|message| LakihakuError::Corpus {
            line: line_number,
            message,
        })?;

        for section in &document.sections {
            if !section_ids.insert(section.id.clone()) {
                return Err(LakihakuError::Corpus {
                    line: line_number,
                    message: format!("duplicate section id {}", section.id),
                });
            }
        }

        documents.push(document);
    }

    Ok(documents)
}

/// Load a JSONL corpus file
pub fn load_corpus(path: &Path) -> Result<Vec<CorpusDocument>> {
    let file = std::fs::File::open(path).map_err(|e| LakihakuError::Io {
        source: e,
        context: format!("Failed to open corpus: {:?}", path),
    })?;
    let documents = parse_corpus(std::io::BufReader::new(file))?;
    tracing::info!("Loaded {} documents from {:?}", documents.len(), path);
    Ok(documents)
}
