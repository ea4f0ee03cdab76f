use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::workflows::screening::context::StageInput;
use crate::workflows::screening::payload::StagePayload;
use crate::workflows::screening::stage::{Stage, StageError};

use super::ingestion::digits;
use super::{profile_of, INGESTION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PublicRecords {
    pub bankruptcies: u8,
    pub liens: u8,
    pub judgments: u8,
}

impl PublicRecords {
    pub fn is_clean(&self) -> bool {
        self.bankruptcies == 0 && self.liens == 0 && self.judgments == 0
    }
}

/// Tradeline summary returned by a bureau.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditReport {
    pub bureau: String,
    pub credit_score: u16,
    pub total_accounts: u8,
    /// Accounts opened in the last twelve months.
    pub recent_accounts: u8,
    pub history_years: u8,
    pub hard_inquiries: u8,
    pub delinquent_accounts: u8,
    /// Revolving balance over revolving limit.
    pub utilization: f32,
    pub public_records: PublicRecords,
}

/// Identity fields a bureau needs to locate a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditInquiry {
    pub ssn: String,
    pub full_name: String,
    pub date_of_birth: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreditBureauError {
    #[error("no credit file found for applicant")]
    NoFile,
    #[error("credit bureau unavailable: {0}")]
    Unavailable(String),
}

/// Outbound credit bureau integration.
#[async_trait]
pub trait CreditBureau: Send + Sync {
    async fn pull_report(&self, inquiry: &CreditInquiry) -> Result<CreditReport, CreditBureauError>;
}

/// Deterministic bureau keyed on SSN digits. Specific files can be pinned
/// with [`SyntheticCreditBureau::with_report`].
#[derive(Debug, Clone, Default)]
pub struct SyntheticCreditBureau {
    pinned: HashMap<String, CreditReport>,
}

const SCORE_BANDS: [(u16, u16); 4] = [(580, 669), (670, 739), (740, 799), (800, 850)];

impl SyntheticCreditBureau {
    pub const NAME: &'static str = "synthetic";

    pub fn with_report(mut self, ssn: &str, report: CreditReport) -> Self {
        self.pinned.insert(digits(ssn), report);
        self
    }

    pub fn generate(ssn: &str) -> CreditReport {
        let seed: u32 = digits(ssn)
            .bytes()
            .enumerate()
            .map(|(idx, byte)| u32::from(byte - b'0') * (idx as u32 + 1))
            .sum();

        let (low, high) = SCORE_BANDS[(seed % 4) as usize];
        let span = u32::from(high - low) + 1;
        let credit_score = low + ((seed * 7) % span) as u16;

        let total_accounts = match credit_score {
            score if score < 600 => 3,
            score if score < 700 => 5,
            _ => 8,
        };
        let strong = credit_score > 650;

        CreditReport {
            bureau: Self::NAME.to_string(),
            credit_score,
            total_accounts,
            recent_accounts: (seed % 3) as u8,
            history_years: 2 + (seed % 12) as u8,
            hard_inquiries: (seed % 6) as u8,
            delinquent_accounts: if strong { 0 } else { (seed % 3) as u8 },
            utilization: 0.10 + (seed % 50) as f32 / 100.0,
            public_records: PublicRecords {
                bankruptcies: 0,
                liens: u8::from(!strong && seed % 10 == 0),
                judgments: 0,
            },
        }
    }
}

#[async_trait]
impl CreditBureau for SyntheticCreditBureau {
    async fn pull_report(&self, inquiry: &CreditInquiry) -> Result<CreditReport, CreditBureauError> {
        let ssn = digits(&inquiry.ssn);
        if ssn.len() != 9 {
            return Err(CreditBureauError::NoFile);
        }
        Ok(self
            .pinned
            .get(&ssn)
            .cloned()
            .unwrap_or_else(|| Self::generate(&ssn)))
    }
}

/// Pulls the applicant's credit file once ingestion has validated the
/// submission.
#[derive(Clone)]
pub struct CreditStage {
    bureau: Arc<dyn CreditBureau>,
}

impl CreditStage {
    pub fn new(bureau: Arc<dyn CreditBureau>) -> Self {
        Self { bureau }
    }
}

#[async_trait]
impl Stage for CreditStage {
    async fn execute(&self, input: &StageInput) -> Result<StagePayload, StageError> {
        let profile =
            profile_of(input).ok_or_else(|| StageError::MissingDependency(INGESTION.to_string()))?;

        let applicant = &input.submission().applicant;
        let inquiry = CreditInquiry {
            ssn: applicant.ssn.clone(),
            full_name: profile.full_name.clone(),
            date_of_birth: applicant.date_of_birth.clone(),
        };

        let report = self.bureau.pull_report(&inquiry).await.map_err(|err| match err {
            CreditBureauError::NoFile => StageError::Failed(err.to_string()),
            CreditBureauError::Unavailable(_) => StageError::Unavailable(err.to_string()),
        })?;

        Ok(StagePayload::Credit(report))
    }
}
