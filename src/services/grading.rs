use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::{debug, error, info};

use crate::db::repository;
use crate::error::AppError;
use crate::models::{
    CcEfIds, ClassStatistics, EctsSummary, Grade, Mention, SemesterQuery, SemesterStudentData,
    SemesterSubjectGrade, Student, StudentSummary, Subject,
};

pub const CC_WEIGHT: f64 = 0.4;
pub const EF_WEIGHT: f64 = 0.6;
pub const PASSING_AVERAGE: f64 = 10.0;

/// Read side of the semester computation.
#[async_trait]
pub trait GradeSource: Send + Sync {
    async fn subjects_for_semester(&self, program_id: &str, semester: i32) -> Result<Vec<Subject>, AppError>;
    async fn cc_ef_ids(&self) -> Result<CcEfIds, AppError>;
    async fn active_students(&self, program_id: &str, group_id: Option<&str>) -> Result<Vec<Student>, AppError>;
    async fn semester_grades(
        &self,
        student_ids: &[String],
        subject_ids: &[String],
        semester: i32,
        academic_year: &str,
    ) -> Result<Vec<Grade>, AppError>;
}

pub struct SqlGradeSource {
    db: SqlitePool,
}

impl SqlGradeSource {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GradeSource for SqlGradeSource {
    async fn subjects_for_semester(&self, program_id: &str, semester: i32) -> Result<Vec<Subject>, AppError> {
        Ok(repository::fetch_subjects_for_semester(&self.db, program_id, semester).await?)
    }

    async fn cc_ef_ids(&self) -> Result<CcEfIds, AppError> {
        Ok(repository::fetch_cc_ef_ids(&self.db).await?)
    }

    async fn active_students(&self, program_id: &str, group_id: Option<&str>) -> Result<Vec<Student>, AppError> {
        Ok(repository::fetch_active_students(&self.db, program_id, group_id).await?)
    }

    async fn semester_grades(
        &self,
        student_ids: &[String],
        subject_ids: &[String],
        semester: i32,
        academic_year: &str,
    ) -> Result<Vec<Grade>, AppError> {
        Ok(repository::fetch_semester_grades(&self.db, student_ids, subject_ids, semester, academic_year).await?)
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Blends CC and EF: 40/60 when both exist, otherwise whichever one is present.
pub fn subject_average(cc: Option<f64>, ef: Option<f64>) -> Option<f64> {
    let raw = match (cc, ef) {
        (Some(cc), Some(ef)) => cc * CC_WEIGHT + ef * EF_WEIGHT,
        (None, Some(ef)) => ef,
        (Some(cc), None) => cc,
        (None, None) => return None,
    };
    Some(round2(raw))
}

/// Coefficient-weighted mean over subjects that have a moyenne. Not rounded; the
/// mention is tiered on this exact value.
pub fn semester_average<'a, I>(subjects: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a SemesterSubjectGrade>,
{
    let mut weighted_sum = 0.0;
    let mut total_coefficient = 0.0;

    for subject in subjects {
        if let Some(moyenne) = subject.moyenne {
            let coefficient = f64::from(subject.coefficient);
            weighted_sum += moyenne * coefficient;
            total_coefficient += coefficient;
        }
    }

    if total_coefficient > 0.0 {
        Some(weighted_sum / total_coefficient)
    } else {
        None
    }
}

pub fn mention_for(average: f64) -> Mention {
    if average >= 16.0 {
        Mention::TresBien
    } else if average >= 14.0 {
        Mention::Bien
    } else if average >= 12.0 {
        Mention::AssezBien
    } else if average >= PASSING_AVERAGE {
        Mention::Passable
    } else {
        Mention::Insuffisant
    }
}

/// Builds one record per student from already-fetched rows.
pub fn build_semester_data(
    students: &[Student],
    subjects: &[Subject],
    ids: &CcEfIds,
    grades: &[Grade],
) -> Vec<SemesterStudentData> {
    let mut slots: HashMap<&str, BTreeMap<String, SemesterSubjectGrade>> = students
        .iter()
        .map(|student| {
            let empty_slots = subjects
                .iter()
                .map(|subject| (subject.id.clone(), SemesterSubjectGrade::empty(subject.credits)))
                .collect();
            (student.id.as_str(), empty_slots)
        })
        .collect();

    for grade in grades {
        let Some(slot) = slots
            .get_mut(grade.student_id.as_str())
            .and_then(|subjects| subjects.get_mut(&grade.subject_id))
        else {
            continue;
        };

        if ids.cc.as_deref() == Some(grade.evaluation_type_id.as_str()) {
            slot.cc = Some(grade.value);
        } else if ids.ef.as_deref() == Some(grade.evaluation_type_id.as_str()) {
            slot.ef = Some(grade.value);
        }
    }

    students
        .iter()
        .map(|student| {
            let mut subject_grades = slots.remove(student.id.as_str()).unwrap_or_default();
            for slot in subject_grades.values_mut() {
                slot.moyenne = subject_average(slot.cc, slot.ef);
            }
            let average = semester_average(subject_grades.values());

            SemesterStudentData {
                student: StudentSummary {
                    id: student.id.clone(),
                    student_number: student.student_number.clone(),
                    full_name: student.full_name(),
                },
                subjects: subject_grades,
                semester_average: average,
                mention: average.map(mention_for),
            }
        })
        .collect()
}

/// Attempted credits are all subjects; earned ones need a passing moyenne.
pub fn ects_summary(data: &SemesterStudentData) -> EctsSummary {
    let mut attempted = 0;
    let mut earned = 0;
    for slot in data.subjects.values() {
        attempted += slot.coefficient;
        if slot.moyenne.is_some_and(|m| m >= PASSING_AVERAGE) {
            earned += slot.coefficient;
        }
    }

    EctsSummary {
        student_id: data.student.id.clone(),
        credits_attempted: attempted,
        credits_earned: earned,
    }
}

pub fn class_statistics(data: &[SemesterStudentData]) -> ClassStatistics {
    let averages: Vec<f64> = data.iter().filter_map(|d| d.semester_average).collect();
    if averages.is_empty() {
        return ClassStatistics {
            student_count: data.len(),
            graded_count: 0,
            class_average: None,
            min_average: None,
            max_average: None,
            pass_rate: None,
        };
    }

    let count = averages.len() as f64;
    let passed = averages.iter().filter(|a| **a >= PASSING_AVERAGE).count() as f64;

    ClassStatistics {
        student_count: data.len(),
        graded_count: averages.len(),
        class_average: Some(round2(averages.iter().sum::<f64>() / count)),
        min_average: averages.iter().copied().reduce(f64::min),
        max_average: averages.iter().copied().reduce(f64::max),
        pass_rate: Some(round2(passed * 100.0 / count)),
    }
}

pub struct SemesterAverageService {
    source: Arc<dyn GradeSource>,
}

impl SemesterAverageService {
    pub fn new(source: Arc<dyn GradeSource>) -> Self {
        Self { source }
    }

    /// Any failed fetch aborts the whole computation; there are no partial results.
    pub async fn calculate(&self, query: &SemesterQuery) -> Result<Vec<SemesterStudentData>, AppError> {
        info!(
            "Calculating semester averages: program={} semester={} year={}",
            query.program_id, query.semester, query.academic_year
        );

        match self.calculate_inner(query).await {
            Ok(data) => {
                info!("Computed averages for {} students", data.len());
                Ok(data)
            }
            Err(e) => {
                error!("semester average calculation failed: {}", e);
                Err(e)
            }
        }
    }

    async fn calculate_inner(&self, query: &SemesterQuery) -> Result<Vec<SemesterStudentData>, AppError> {
        let subjects = self
            .source
            .subjects_for_semester(&query.program_id, query.semester)
            .await?;
        let ids = self.source.cc_ef_ids().await?;
        let students = self
            .source
            .active_students(&query.program_id, query.group_id.as_deref())
            .await?;

        let student_ids: Vec<String> = students.iter().map(|s| s.id.clone()).collect();
        let subject_ids: Vec<String> = subjects.iter().map(|s| s.id.clone()).collect();
        let grades = self
            .source
            .semester_grades(&student_ids, &subject_ids, query.semester, &query.academic_year)
            .await?;

        debug!(
            "Fetched {} subjects, {} students, {} grades",
            subjects.len(),
            students.len(),
            grades.len()
        );

        Ok(build_semester_data(&students, &subjects, &ids, &grades))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(moyenne: Option<f64>, coefficient: i32) -> SemesterSubjectGrade {
        SemesterSubjectGrade {
            cc: None,
            ef: None,
            moyenne,
            coefficient,
        }
    }

    #[test]
    fn blends_cc_and_ef() {
        assert_eq!(subject_average(Some(12.0), Some(14.0)), Some(13.2));
        assert_eq!(subject_average(Some(10.0), Some(10.0)), Some(10.0));
        assert_eq!(subject_average(Some(11.37), Some(15.11)), Some(13.61));
    }

    #[test]
    fn single_grade_is_taken_as_is() {
        assert_eq!(subject_average(None, Some(16.0)), Some(16.0));
        assert_eq!(subject_average(Some(9.5), None), Some(9.5));
        assert_eq!(subject_average(None, None), None);
    }

    #[test]
    fn ungraded_subjects_do_not_count() {
        let subjects = [slot(Some(12.0), 3), slot(None, 100)];
        assert_eq!(semester_average(subjects.iter()), Some(12.0));
    }

    #[test]
    fn no_grades_means_no_average() {
        let subjects = [slot(None, 3), slot(None, 5)];
        assert_eq!(semester_average(subjects.iter()), None);
        assert_eq!(semester_average(std::iter::empty::<&SemesterSubjectGrade>()), None);
    }

    #[test]
    fn mention_uses_the_exact_average() {
        let subjects = [slot(Some(16.0), 3), slot(Some(15.99), 1)];
        let average = semester_average(subjects.iter()).unwrap();
        assert!((average - 15.9975).abs() < 1e-9, "got {}", average);
        assert_eq!(mention_for(average), Mention::Bien);
    }

    #[test]
    fn zero_coefficient_subjects_give_no_average() {
        let subjects = [slot(Some(15.0), 0)];
        assert_eq!(semester_average(subjects.iter()), None);
    }

    #[test]
    fn mention_boundaries_are_inclusive() {
        assert_eq!(mention_for(16.0), Mention::TresBien);
        assert_eq!(mention_for(15.99), Mention::Bien);
        assert_eq!(mention_for(14.0), Mention::Bien);
        assert_eq!(mention_for(12.0), Mention::AssezBien);
        assert_eq!(mention_for(11.99), Mention::Passable);
        assert_eq!(mention_for(10.0), Mention::Passable);
        assert_eq!(mention_for(9.99), Mention::Insuffisant);
        assert_eq!(mention_for(0.0), Mention::Insuffisant);
    }

    #[test]
    fn mention_serializes_with_french_label() {
        let json = serde_json::to_string(&Mention::TresBien).unwrap();
        assert_eq!(json, "\"Très Bien\"");
        assert_eq!(Mention::AssezBien.to_string(), "Assez Bien");
    }

    #[test]
    fn statistics_skip_ungraded_students() {
        let make = |avg: Option<f64>| SemesterStudentData {
            student: StudentSummary {
                id: "s".to_string(),
                student_number: "n".to_string(),
                full_name: "x".to_string(),
            },
            subjects: BTreeMap::new(),
            semester_average: avg,
            mention: avg.map(mention_for),
        };
        let stats = class_statistics(&[make(Some(8.0)), make(Some(14.0)), make(None)]);
        assert_eq!(stats.student_count, 3);
        assert_eq!(stats.graded_count, 2);
        assert_eq!(stats.class_average, Some(11.0));
        assert_eq!(stats.min_average, Some(8.0));
        assert_eq!(stats.max_average, Some(14.0));
        assert_eq!(stats.pass_rate, Some(50.0));
    }
}
