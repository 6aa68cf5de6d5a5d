use crate::error::AggregateError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Village {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub village_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialCategory {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Generus {
    pub id: String,
    pub group_id: String,
    pub category_id: i64,
    pub name: String,
    pub gender: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub month: u32,
    pub year: i32,
}

impl Period {
    pub fn new(month: u32, year: i32) -> Result<Self, AggregateError> {
        if !(2000..=2100).contains(&year) || NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(AggregateError::InvalidPeriod { month, year });
        }
        Ok(Self { month, year })
    }

    /// Accepts `YYYY-MM`.
    pub fn parse_key(raw: &str) -> Result<Self, AggregateError> {
        let invalid = AggregateError::InvalidPeriod { month: 0, year: 0 };
        let Some((y, m)) = raw.trim().split_once('-') else {
            return Err(invalid);
        };
        let year = y.parse::<i32>().map_err(|_| invalid.clone())?;
        let month = m.parse::<u32>().map_err(|_| invalid)?;
        Self::new(month, year)
    }

    pub fn key(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

/// One learner's attendance inside a recap. The name is frozen when the row is
/// entered so the recap stays accurate after roster edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAttendanceRecord {
    pub student_id: String,
    pub name_snapshot: String,
    pub present_count: u32,
    pub permission_count: u32,
    pub absent_count: u32,
}

impl StudentAttendanceRecord {
    pub fn total(&self) -> u64 {
        u64::from(self.present_count) + u64::from(self.permission_count) + u64::from(self.absent_count)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRawData {
    #[serde(default)]
    pub count_male: u32,
    #[serde(default)]
    pub count_female: u32,
    #[serde(default)]
    pub count_total: u32,
    #[serde(default, with = "attendance_map")]
    pub attendances: Vec<StudentAttendanceRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecap {
    pub id: String,
    pub group_id: String,
    pub category_id: i64,
    pub period_month: u32,
    pub period_year: i32,
    pub meeting_count: u32,
    pub generus_count: u32,
    pub raw_data: AttendanceRawData,
    pub present_amount: u32,
    pub present_percentage: f64,
    pub permission_amount: u32,
    pub permission_percentage: f64,
    pub absent_amount: u32,
    pub absent_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentScore {
    pub student_id: String,
    pub name: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationEntry {
    pub material_id: i64,
    pub material_name: String,
    pub material_category_id: i64,
    #[serde(default)]
    pub material_category_name: String,
    #[serde(default, with = "score_map")]
    pub scores: Vec<StudentScore>,
    #[serde(default)]
    pub evaluation_note: String,
    #[serde(default = "default_show_details")]
    pub show_details: bool,
}

fn default_show_details() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRecap {
    pub id: String,
    pub group_id: String,
    pub category_id: i64,
    pub period_month: u32,
    pub period_year: i32,
    pub raw_data: Vec<EvaluationEntry>,
    pub challenges: Option<String>,
    pub solutions: Option<String>,
    pub notes: Option<String>,
    pub achievement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualMaterialNote {
    pub material_id: i64,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementNote {
    pub topic: String,
    pub text: String,
}

/// Legacy free-form report for one group/category/period, kept for groups that
/// never moved to structured recaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualKbmReport {
    pub id: String,
    pub group_id: String,
    pub category_id: i64,
    pub period_month: u32,
    pub period_year: i32,
    pub count_male: u32,
    pub count_female: u32,
    pub count_total: u32,
    pub present_percentage: f64,
    pub permission_percentage: f64,
    pub absent_percentage: f64,
    #[serde(with = "material_note_map")]
    pub raw_data: Vec<ManualMaterialNote>,
    pub achievements: Vec<AchievementNote>,
    pub program_success_info: Option<String>,
    pub challenges_info: Option<String>,
}

pub fn decode_manual_notes(text: &str) -> serde_json::Result<Vec<ManualMaterialNote>> {
    let mut de = serde_json::Deserializer::from_str(text);
    let notes = material_note_map::deserialize(&mut de)?;
    de.end()?;
    Ok(notes)
}

pub fn encode_manual_notes(notes: &[ManualMaterialNote]) -> serde_json::Result<String> {
    let value = material_note_map::serialize(notes, serde_json::value::Serializer)?;
    Ok(value.to_string())
}

/// Stored as `{ "<studentId>": { "name", "present", "permission", "absent" } }`.
/// Reading keeps document order; a repeated id replaces the earlier row in place.
mod attendance_map {
    use super::StudentAttendanceRecord;
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::fmt;

    #[derive(Serialize, Deserialize)]
    struct Stored {
        #[serde(default)]
        name: String,
        #[serde(default)]
        present: u32,
        #[serde(default)]
        permission: u32,
        #[serde(default)]
        absent: u32,
    }

    pub fn serialize<S: Serializer>(
        records: &[StudentAttendanceRecord],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(records.len()))?;
        for r in records {
            map.serialize_entry(
                &r.student_id,
                &Stored {
                    name: r.name_snapshot.clone(),
                    present: r.present_count,
                    permission: r.permission_count,
                    absent: r.absent_count,
                },
            )?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<StudentAttendanceRecord>, D::Error> {
        struct RecordsVisitor;

        impl<'de> Visitor<'de> for RecordsVisitor {
            type Value = Vec<StudentAttendanceRecord>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of student id to attendance counts")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut out: Vec<StudentAttendanceRecord> = Vec::new();
                while let Some((student_id, s)) = access.next_entry::<String, Stored>()? {
                    let rec = StudentAttendanceRecord {
                        student_id,
                        name_snapshot: s.name,
                        present_count: s.present,
                        permission_count: s.permission,
                        absent_count: s.absent,
                    };
                    match out.iter_mut().find(|r| r.student_id == rec.student_id) {
                        Some(existing) => *existing = rec,
                        None => out.push(rec),
                    }
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(RecordsVisitor)
    }
}

/// Stored as `{ "<studentId>": { "name", "score" } }`.
mod score_map {
    use super::StudentScore;
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::fmt;

    #[derive(Serialize, Deserialize)]
    struct Stored {
        #[serde(default)]
        name: String,
        #[serde(default)]
        score: f64,
    }

    pub fn serialize<S: Serializer>(scores: &[StudentScore], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(scores.len()))?;
        for s in scores {
            map.serialize_entry(
                &s.student_id,
                &Stored {
                    name: s.name.clone(),
                    score: s.score,
                },
            )?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<StudentScore>, D::Error> {
        struct ScoresVisitor;

        impl<'de> Visitor<'de> for ScoresVisitor {
            type Value = Vec<StudentScore>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of student id to score")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut out: Vec<StudentScore> = Vec::new();
                while let Some((student_id, s)) = access.next_entry::<String, Stored>()? {
                    let score = StudentScore {
                        student_id,
                        name: s.name,
                        score: s.score,
                    };
                    match out.iter_mut().find(|x| x.student_id == score.student_id) {
                        Some(existing) => *existing = score,
                        None => out.push(score),
                    }
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(ScoresVisitor)
    }
}

/// Legacy manual reports keep notes as `{ "<materialId>": "note" }`.
mod material_note_map {
    use super::ManualMaterialNote;
    use serde::de::{Error as _, MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(
        notes: &[ManualMaterialNote],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(notes.len()))?;
        for n in notes {
            map.serialize_entry(&n.material_id.to_string(), &n.note)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<ManualMaterialNote>, D::Error> {
        struct NotesVisitor;

        impl<'de> Visitor<'de> for NotesVisitor {
            type Value = Vec<ManualMaterialNote>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of material id to note")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut out: Vec<ManualMaterialNote> = Vec::new();
                while let Some((key, note)) = access.next_entry::<String, String>()? {
                    let material_id = key
                        .trim()
                        .parse::<i64>()
                        .map_err(|_| A::Error::custom(format!("bad material id: {}", key)))?;
                    match out.iter_mut().find(|n| n.material_id == material_id) {
                        Some(existing) => existing.note = note,
                        None => out.push(ManualMaterialNote { material_id, note }),
                    }
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(NotesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attendance_map_keeps_document_order() {
        let text = r#"{
            "countMale": 1,
            "countFemale": 1,
            "countTotal": 2,
            "attendances": {
                "s-9": { "name": "Zaki", "present": 3, "permission": 1, "absent": 0 },
                "s-1": { "name": "Aisyah", "present": 4, "permission": 0, "absent": 0 }
            }
        }"#;
        let raw: AttendanceRawData = serde_json::from_str(text).expect("parse raw data");
        assert_eq!(raw.attendances.len(), 2);
        assert_eq!(raw.attendances[0].student_id, "s-9");
        assert_eq!(raw.attendances[0].name_snapshot, "Zaki");
        assert_eq!(raw.attendances[1].present_count, 4);

        let back = serde_json::to_value(&raw).expect("serialize");
        assert_eq!(back["attendances"]["s-1"]["name"], "Aisyah");
    }

    #[test]
    fn manual_notes_round_trip_through_keyed_map() {
        let notes = decode_manual_notes(r#"{ "12": "tajwid basics", "3": "wudhu" }"#)
            .expect("decode notes");
        assert_eq!(notes[0].material_id, 12);
        assert_eq!(notes[1].note, "wudhu");
        let text = encode_manual_notes(&notes).expect("encode notes");
        assert!(text.contains("\"12\":\"tajwid basics\""));
        assert!(decode_manual_notes(r#"{ "abc": "note" }"#).is_err());
    }

    #[test]
    fn period_validation() {
        assert!(Period::new(13, 2024).is_err());
        assert!(Period::new(0, 2024).is_err());
        assert!(Period::new(5, 1999).is_err());
        let p = Period::parse_key("2024-05").expect("parse key");
        assert_eq!(p, Period { month: 5, year: 2024 });
        assert_eq!(p.key(), "2024-05");
        assert!(Period::parse_key("May 2024").is_err());
    }
}
