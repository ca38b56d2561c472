pub mod evaluation;
pub mod grade;
pub mod program;
pub mod semester;
pub mod student;
pub mod subject;

pub use evaluation::{CcEfIds, EvaluationType, NewEvaluationTypeRequest};
pub use grade::{Grade, GradeChange, PublishGradesRequest, UpsertGradeRequest};
pub use program::{NewProgramRequest, Program};
pub use semester::{
    ClassStatistics, EctsSummary, Mention, SemesterQuery, SemesterStudentData,
    SemesterSubjectGrade, StudentSummary,
};
pub use student::{NewStudentRequest, Student, StudentStatus, UpdateStudentStatusRequest};
pub use subject::{NewSubjectRequest, Subject};
