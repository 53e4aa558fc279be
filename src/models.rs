//! Core data models for the budget Q&A engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Fallback string substituted for any missing or unparsable response field.
/// No field of a normalized answer is ever absent.
pub const SENTINEL: &str = "데이터가 없습니다.";

/// Category used when the classification gateway is unavailable.
pub const DEFAULT_CATEGORY: &str = "예산 관련 질문";

/// Confidence used when the gateway response carries none.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

//
// ================= Enums =================
//

/// The active step of a session. Exactly one step is active at a time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Question,
    Selection,
    Result,
}

/// Budget execution procedure. Serialized as the Korean label the
/// answer gateway and the history table expect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Procedure {
    /// 추가경정 — supplementary budget revision
    #[serde(rename = "추가경정")]
    Supplementary,
    /// 조기집행 — early execution
    #[serde(rename = "조기집행")]
    EarlyExecution,
    /// 이관 — inter-department transfer
    #[serde(rename = "이관")]
    Transfer,
    /// 전용 — diversion between budget items
    #[serde(rename = "전용")]
    Diversion,
}

impl Procedure {
    pub fn label(&self) -> &'static str {
        match self {
            Procedure::Supplementary => "추가경정",
            Procedure::EarlyExecution => "조기집행",
            Procedure::Transfer => "이관",
            Procedure::Diversion => "전용",
        }
    }

    /// Parse from either the form's value keys or the Korean labels.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "additional" | "추가경정" => Some(Procedure::Supplementary),
            "early" | "조기집행" => Some(Procedure::EarlyExecution),
            "transfer" | "이관" => Some(Procedure::Transfer),
            "diversion" | "전용" => Some(Procedure::Diversion),
            _ => None,
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

//
// ================= Classification =================
//

/// Normalized result of the classification gateway call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationResult {
    pub question: String,
    pub category: String,
    pub confidence: f64,
}

impl ClassificationResult {
    /// Fail-open default used when the gateway is unreachable.
    pub fn fallback(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            category: DEFAULT_CATEGORY.to_string(),
            confidence: DEFAULT_CONFIDENCE,
        }
    }

    /// Confidence as a rounded percentage for display.
    pub fn confidence_percent(&self) -> u8 {
        (self.confidence.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

//
// ================= Selection =================
//

/// Confirmed user selection: amount in base won plus execution procedure.
///
/// The amount is entered in 10,000-won units and scaled exactly once here;
/// it is never re-derived after confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Selection {
    pub amount_won: i64,
    pub procedure: Procedure,
}

impl Selection {
    /// Build from raw form input. Both fields are required; the amount may be
    /// comma-formatted ("1,000" means 1,000만원 = 10,000,000원).
    pub fn from_input(amount: &str, procedure: &str) -> crate::Result<Self> {
        let amount_won = parse_amount(amount)?;
        let procedure = Procedure::parse(procedure).ok_or_else(|| {
            crate::error::SessionError::Validation(format!("unknown procedure: {}", procedure))
        })?;
        Ok(Self { amount_won, procedure })
    }
}

/// Parse a 10,000-won-unit amount string into base won.
pub fn parse_amount(input: &str) -> crate::Result<i64> {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(crate::error::SessionError::Validation(
            "예산 금액을 입력해주세요.".to_string(),
        ));
    }
    let units: i64 = digits.parse().map_err(|_| {
        crate::error::SessionError::Validation(format!("invalid amount: {}", input))
    })?;
    units.checked_mul(10_000).ok_or_else(|| {
        crate::error::SessionError::Validation(format!("amount out of range: {}", input))
    })
}

//
// ================= Answer =================
//

/// Normalized answer gateway response.
///
/// Structured bodies keep the gateway's field names on the wire and in the
/// history table; anything else degrades to the plain-text shape. Sentinel
/// filling guarantees no field is ever absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AnswerRecord {
    Structured {
        #[serde(rename = "결재라인")]
        approval_line: String,
        #[serde(rename = "참고규정항목")]
        regulation_reference: String,
        #[serde(rename = "설명")]
        explanation: String,
    },
    PlainText { text: String },
}

impl AnswerRecord {
    /// Fully sentinel-filled record, used when the gateway body is empty,
    /// unparsable, or a bare acknowledgement.
    pub fn sentinel() -> Self {
        AnswerRecord::Structured {
            approval_line: SENTINEL.to_string(),
            regulation_reference: SENTINEL.to_string(),
            explanation: SENTINEL.to_string(),
        }
    }

    pub fn approver(&self) -> Option<&str> {
        match self {
            AnswerRecord::Structured { approval_line, .. } => Some(approval_line),
            AnswerRecord::PlainText { .. } => None,
        }
    }

    pub fn document(&self) -> Option<&str> {
        match self {
            AnswerRecord::Structured { regulation_reference, .. } => Some(regulation_reference),
            AnswerRecord::PlainText { .. } => None,
        }
    }

    /// The primary display text.
    pub fn explanation(&self) -> &str {
        match self {
            AnswerRecord::Structured { explanation, .. } => explanation,
            AnswerRecord::PlainText { text } => text,
        }
    }

    /// Serialized form persisted in the history table's `answer` column.
    pub fn to_stored(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| SENTINEL.to_string())
    }
}

//
// ================= Session =================
//

/// One complete question-to-answer interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub question: String,
    pub category: String,
    pub confidence: f64,
    /// Always present for sessions finalized through the live flow; history
    /// rows written before the selection fields existed may lack it.
    pub selection: Option<Selection>,
    pub answer: AnswerRecord,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Reconstruct a session from a persisted history row, bypassing both
    /// gateways. Rows whose `answer` column is not valid JSON are rebuilt
    /// from the flat columns with sentinel fills.
    pub fn from_entry(entry: &HistoryEntry) -> Self {
        let answer = match serde_json::from_str::<AnswerRecord>(&entry.answer) {
            Ok(record) => record,
            Err(_) => AnswerRecord::Structured {
                approval_line: entry
                    .approver
                    .clone()
                    .unwrap_or_else(|| SENTINEL.to_string()),
                regulation_reference: entry
                    .document
                    .clone()
                    .unwrap_or_else(|| SENTINEL.to_string()),
                explanation: if entry.answer.is_empty() {
                    SENTINEL.to_string()
                } else {
                    entry.answer.clone()
                },
            },
        };

        let selection = match (&entry.amount, &entry.procedure) {
            (Some(amount), Some(procedure)) => {
                match (amount.parse::<i64>(), Procedure::parse(procedure)) {
                    (Ok(amount_won), Some(procedure)) => {
                        Some(Selection { amount_won, procedure })
                    }
                    _ => None,
                }
            }
            _ => None,
        };

        Self {
            question: entry.question.clone(),
            category: entry.category.clone(),
            confidence: entry.confidence,
            selection,
            answer,
            created_at: entry.created_at,
        }
    }
}

//
// ================= History Row =================
//

/// Persisted projection of a finished session. Owned by the history store;
/// the engine only inserts and deletes whole rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub question: String,
    pub category: String,
    pub confidence: f64,
    /// Serialized [`AnswerRecord`].
    pub answer: String,
    pub amount: Option<String>,
    pub procedure: Option<String>,
    pub approver: Option<String>,
    pub document: Option<String>,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn from_session(session: &Session, user_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: session.question.clone(),
            category: session.category.clone(),
            confidence: session.confidence,
            answer: session.answer.to_stored(),
            amount: session
                .selection
                .as_ref()
                .map(|s| s.amount_won.to_string()),
            procedure: session.selection.as_ref().map(|s| s.procedure.label().to_string()),
            approver: session.answer.approver().map(str::to_string),
            document: session.answer.document().map(str::to_string),
            user_id,
            created_at: session.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_scaling() {
        assert_eq!(parse_amount("1,000").unwrap(), 10_000_000);
        assert_eq!(parse_amount("300").unwrap(), 3_000_000);
        assert_eq!(parse_amount("12,000").unwrap(), 120_000_000);
    }

    #[test]
    fn test_amount_requires_digits() {
        assert!(parse_amount("").is_err());
        assert!(parse_amount("만원").is_err());
    }

    #[test]
    fn test_amount_overflow_is_rejected() {
        // Fits in i64 but overflows when scaled to base won.
        assert!(parse_amount("922337203685477581").is_err());
        // Does not fit in i64 at all.
        assert!(parse_amount("99999999999999999999").is_err());
        // Largest representable scaled amount still parses.
        assert_eq!(parse_amount("922337203685477").unwrap(), 9_223_372_036_854_770_000);
    }

    #[test]
    fn test_procedure_parsing() {
        assert_eq!(Procedure::parse("additional"), Some(Procedure::Supplementary));
        assert_eq!(Procedure::parse("조기집행"), Some(Procedure::EarlyExecution));
        assert_eq!(Procedure::parse("transfer"), Some(Procedure::Transfer));
        assert_eq!(Procedure::parse("전용"), Some(Procedure::Diversion));
        assert_eq!(Procedure::parse("unknown"), None);
    }

    #[test]
    fn test_selection_requires_both_fields() {
        assert!(Selection::from_input("", "additional").is_err());
        assert!(Selection::from_input("1,000", "").is_err());
        let selection = Selection::from_input("1,000", "additional").unwrap();
        assert_eq!(selection.amount_won, 10_000_000);
        assert_eq!(selection.procedure, Procedure::Supplementary);
    }

    #[test]
    fn test_answer_record_stored_shape() {
        let record = AnswerRecord::Structured {
            approval_line: "부서장, 예산팀장".to_string(),
            regulation_reference: "예산 규정 제12조".to_string(),
            explanation: "부서장 승인 후 예산팀 검토가 필요합니다.".to_string(),
        };

        let stored = record.to_stored();
        assert!(stored.contains("결재라인"));

        let parsed: AnswerRecord = serde_json::from_str(&stored).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_sentinel_record_has_no_missing_fields() {
        let record = AnswerRecord::sentinel();
        assert_eq!(record.approver(), Some(SENTINEL));
        assert_eq!(record.document(), Some(SENTINEL));
        assert_eq!(record.explanation(), SENTINEL);
    }

    #[test]
    fn test_confidence_percent_is_clamped() {
        let mut result = ClassificationResult::fallback("q");
        assert_eq!(result.confidence_percent(), 80);
        result.confidence = 1.7;
        assert_eq!(result.confidence_percent(), 100);
        result.confidence = -0.2;
        assert_eq!(result.confidence_percent(), 0);
    }

    #[test]
    fn test_session_from_entry_with_json_answer() {
        let record = AnswerRecord::Structured {
            approval_line: "부서장".to_string(),
            regulation_reference: "제3조".to_string(),
            explanation: "설명입니다.".to_string(),
        };
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            question: "예산 승인 절차는?".to_string(),
            category: "예산 승인 절차".to_string(),
            confidence: 0.9,
            answer: record.to_stored(),
            amount: Some("10000000".to_string()),
            procedure: Some("추가경정".to_string()),
            approver: Some("부서장".to_string()),
            document: Some("제3조".to_string()),
            user_id: None,
            created_at: Utc::now(),
        };

        let session = Session::from_entry(&entry);
        assert_eq!(session.answer, record);
        let selection = session.selection.unwrap();
        assert_eq!(selection.amount_won, 10_000_000);
        assert_eq!(selection.procedure, Procedure::Supplementary);
    }

    #[test]
    fn test_session_from_entry_with_raw_text_answer() {
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            question: "출장비는?".to_string(),
            category: "출장비 관리".to_string(),
            confidence: 0.8,
            answer: "그냥 텍스트 답변".to_string(),
            amount: None,
            procedure: None,
            approver: None,
            document: Some("출장 규정".to_string()),
            user_id: None,
            created_at: Utc::now(),
        };

        let session = Session::from_entry(&entry);
        match session.answer {
            AnswerRecord::Structured {
                approval_line,
                regulation_reference,
                explanation,
            } => {
                assert_eq!(approval_line, SENTINEL);
                assert_eq!(regulation_reference, "출장 규정");
                assert_eq!(explanation, "그냥 텍스트 답변");
            }
            _ => panic!("expected structured reconstruction"),
        }
        assert!(session.selection.is_none());
    }
}
