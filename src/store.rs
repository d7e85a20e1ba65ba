//! Repository seam between the grading engine and the workspace database.
//!
//! Handlers load value records through `GradebookStore`, hand them to the
//! engine, and save whatever comes back. Engine modules never see SQL.

use crate::model::{
    Assignment, Criterion, CriterionScore, Level, Rubric, RubricScore, Submission, SubmissionStatus,
};
use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};

pub trait GradebookStore {
    fn get_rubric(&self, id: &str) -> anyhow::Result<Option<Rubric>>;
    fn save_rubric(&self, rubric: &Rubric) -> anyhow::Result<()>;

    fn get_assignment(&self, id: &str) -> anyhow::Result<Option<Assignment>>;
    fn save_assignment(&self, assignment: &Assignment) -> anyhow::Result<()>;
    fn list_assignments(&self, class_id: &str) -> anyhow::Result<Vec<Assignment>>;

    fn get_submission(&self, id: &str) -> anyhow::Result<Option<Submission>>;
    fn find_submission(&self, assignment_id: &str, student_id: &str) -> anyhow::Result<Option<Submission>>;
    fn save_submission(&self, submission: &Submission) -> anyhow::Result<()>;
    fn list_submissions(&self, assignment_id: &str) -> anyhow::Result<Vec<Submission>>;
    fn list_class_submissions(&self, class_id: &str) -> anyhow::Result<Vec<Submission>>;

    fn get_rubric_score(&self, id: &str) -> anyhow::Result<Option<RubricScore>>;
    /// Writes a rubric-graded submission and its breakdown atomically.
    fn save_rubric_grade(&self, submission: &Submission, score: &RubricScore) -> anyhow::Result<()>;
}

fn ts_to_text(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(|t| t.to_rfc3339())
}

fn ts_from_row(r: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = r.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

const SUBMISSION_COLUMNS: &str = "id, assignment_id, student_id, status, submitted_at, score, feedback,
     graded_at, grader_id, attempt_count, is_draft, feedback_requested, rubric_score_id";

fn submission_from_row(r: &Row<'_>) -> rusqlite::Result<Submission> {
    let status_raw: String = r.get(3)?;
    let status = SubmissionStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown submission status: {status_raw}").into(),
        )
    })?;
    Ok(Submission {
        id: r.get(0)?,
        assignment_id: r.get(1)?,
        student_id: r.get(2)?,
        status,
        submitted_at: ts_from_row(r, 4)?,
        score: r.get(5)?,
        feedback: r.get(6)?,
        graded_at: ts_from_row(r, 7)?,
        grader_id: r.get(8)?,
        attempt_count: r.get::<_, i64>(9)?.max(0) as u32,
        is_draft: r.get::<_, i64>(10)? != 0,
        feedback_requested: r.get::<_, i64>(11)? != 0,
        rubric_score_id: r.get(12)?,
    })
}

const ASSIGNMENT_COLUMNS: &str =
    "id, class_id, title, category, total_points, weight, due_date, rubric_id";

fn assignment_from_row(r: &Row<'_>) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        id: r.get(0)?,
        class_id: r.get(1)?,
        title: r.get(2)?,
        category: r.get(3)?,
        total_points: r.get(4)?,
        weight: r.get(5)?,
        due_date: ts_from_row(r, 6)?,
        rubric_id: r.get(7)?,
    })
}

impl GradebookStore for Connection {
    fn get_rubric(&self, id: &str) -> anyhow::Result<Option<Rubric>> {
        let head: Option<(String, i64)> = self
            .query_row(
                "SELECT title, total_points FROM rubrics WHERE id = ?",
                [id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .context("failed to load rubric")?;
        let Some((title, total_points)) = head else {
            return Ok(None);
        };

        let mut crit_stmt = self.prepare(
            "SELECT id, name, points FROM rubric_criteria WHERE rubric_id = ? ORDER BY sort_order",
        )?;
        let rows: Vec<(String, String, i64)> = crit_stmt
            .query_map([id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut level_stmt = self.prepare(
            "SELECT level, description, percent FROM rubric_levels WHERE criterion_id = ? ORDER BY level",
        )?;
        let mut criteria = Vec::with_capacity(rows.len());
        for (cid, name, points) in rows {
            let levels = level_stmt
                .query_map([&cid], |r| {
                    Ok(Level {
                        level: r.get::<_, i64>(0)? as u8,
                        description: r.get(1)?,
                        percent: r.get::<_, i64>(2)? as u8,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            criteria.push(Criterion {
                id: cid,
                name,
                points,
                levels,
            });
        }

        Ok(Some(Rubric {
            id: id.to_string(),
            title,
            total_points,
            criteria,
        }))
    }

    fn save_rubric(&self, rubric: &Rubric) -> anyhow::Result<()> {
        let tx = self.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO rubrics(id, title, total_points) VALUES(?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET title = excluded.title, total_points = excluded.total_points",
            (&rubric.id, &rubric.title, rubric.total_points),
        )?;
        tx.execute(
            "DELETE FROM rubric_levels
             WHERE criterion_id IN (SELECT id FROM rubric_criteria WHERE rubric_id = ?)",
            [&rubric.id],
        )?;
        tx.execute("DELETE FROM rubric_criteria WHERE rubric_id = ?", [&rubric.id])?;
        for (i, c) in rubric.criteria.iter().enumerate() {
            tx.execute(
                "INSERT INTO rubric_criteria(id, rubric_id, sort_order, name, points) VALUES(?, ?, ?, ?, ?)",
                (&c.id, &rubric.id, i as i64, &c.name, c.points),
            )?;
            for l in &c.levels {
                tx.execute(
                    "INSERT INTO rubric_levels(criterion_id, level, description, percent) VALUES(?, ?, ?, ?)",
                    (&c.id, i64::from(l.level), &l.description, i64::from(l.percent)),
                )?;
            }
        }
        tx.commit().context("failed to save rubric")?;
        Ok(())
    }

    fn get_assignment(&self, id: &str) -> anyhow::Result<Option<Assignment>> {
        let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = ?");
        Ok(self
            .query_row(&sql, [id], assignment_from_row)
            .optional()
            .context("failed to load assignment")?)
    }

    fn save_assignment(&self, a: &Assignment) -> anyhow::Result<()> {
        self.execute(
            "INSERT INTO assignments(id, class_id, title, category, total_points, weight, due_date, rubric_id)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               class_id = excluded.class_id,
               title = excluded.title,
               category = excluded.category,
               total_points = excluded.total_points,
               weight = excluded.weight,
               due_date = excluded.due_date,
               rubric_id = excluded.rubric_id",
            (
                &a.id,
                &a.class_id,
                &a.title,
                &a.category,
                a.total_points,
                a.weight,
                ts_to_text(a.due_date),
                &a.rubric_id,
            ),
        )
        .context("failed to save assignment")?;
        Ok(())
    }

    fn list_assignments(&self, class_id: &str) -> anyhow::Result<Vec<Assignment>> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE class_id = ?
             ORDER BY due_date IS NULL, due_date, title"
        );
        let mut stmt = self.prepare(&sql)?;
        let rows = stmt
            .query_map([class_id], assignment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_submission(&self, id: &str) -> anyhow::Result<Option<Submission>> {
        let sql = format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = ?");
        Ok(self
            .query_row(&sql, [id], submission_from_row)
            .optional()
            .context("failed to load submission")?)
    }

    fn find_submission(&self, assignment_id: &str, student_id: &str) -> anyhow::Result<Option<Submission>> {
        let sql = format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE assignment_id = ? AND student_id = ?"
        );
        Ok(self
            .query_row(&sql, (assignment_id, student_id), submission_from_row)
            .optional()
            .context("failed to load submission")?)
    }

    fn save_submission(&self, s: &Submission) -> anyhow::Result<()> {
        upsert_submission(self, s)
    }

    fn list_submissions(&self, assignment_id: &str) -> anyhow::Result<Vec<Submission>> {
        let sql = format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE assignment_id = ? ORDER BY student_id"
        );
        let mut stmt = self.prepare(&sql)?;
        let rows = stmt
            .query_map([assignment_id], submission_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn list_class_submissions(&self, class_id: &str) -> anyhow::Result<Vec<Submission>> {
        let cols = SUBMISSION_COLUMNS
            .split(',')
            .map(|c| format!("s.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {cols}
             FROM submissions s
             JOIN assignments a ON a.id = s.assignment_id
             WHERE a.class_id = ?
             ORDER BY s.assignment_id, s.student_id"
        );
        let mut stmt = self.prepare(&sql)?;
        let rows = stmt
            .query_map([class_id], submission_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_rubric_score(&self, id: &str) -> anyhow::Result<Option<RubricScore>> {
        let head = self
            .query_row(
                "SELECT submission_id, rubric_id, total, created_at FROM rubric_scores WHERE id = ?",
                [id],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, i64>(2)?,
                        ts_from_row(r, 3)?,
                    ))
                },
            )
            .optional()
            .context("failed to load rubric score")?;
        let Some((submission_id, rubric_id, total, created_at)) = head else {
            return Ok(None);
        };

        let mut stmt = self.prepare(
            "SELECT criterion_id, level, score, comment FROM criterion_scores
             WHERE rubric_score_id = ? ORDER BY sort_order",
        )?;
        let scores = stmt
            .query_map([id], |r| {
                Ok(CriterionScore {
                    criterion_id: r.get(0)?,
                    level: r.get::<_, Option<i64>>(1)?.map(|l| l as u8),
                    score: r.get(2)?,
                    comment: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(RubricScore {
            id: id.to_string(),
            submission_id,
            rubric_id,
            scores,
            total,
            created_at: created_at.unwrap_or_else(Utc::now),
        }))
    }

    fn save_rubric_grade(&self, sub: &Submission, rs: &RubricScore) -> anyhow::Result<()> {
        let tx = self.unchecked_transaction()?;
        upsert_submission(&tx, sub)?;
        upsert_rubric_score(&tx, rs)?;
        tx.commit().context("failed to save rubric grade")?;
        Ok(())
    }
}

fn upsert_submission(conn: &Connection, s: &Submission) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO submissions(id, assignment_id, student_id, status, submitted_at, score, feedback,
                                 graded_at, grader_id, attempt_count, is_draft, feedback_requested, rubric_score_id)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           status = excluded.status,
           submitted_at = excluded.submitted_at,
           score = excluded.score,
           feedback = excluded.feedback,
           graded_at = excluded.graded_at,
           grader_id = excluded.grader_id,
           attempt_count = excluded.attempt_count,
           is_draft = excluded.is_draft,
           feedback_requested = excluded.feedback_requested,
           rubric_score_id = excluded.rubric_score_id",
        rusqlite::params![
            &s.id,
            &s.assignment_id,
            &s.student_id,
            s.status.as_str(),
            ts_to_text(s.submitted_at),
            s.score,
            &s.feedback,
            ts_to_text(s.graded_at),
            &s.grader_id,
            i64::from(s.attempt_count),
            s.is_draft as i64,
            s.feedback_requested as i64,
            &s.rubric_score_id,
        ],
    )
    .context("failed to save submission")?;
    Ok(())
}

/// Replaces the breakdown rows wholesale; the caller owns the transaction.
fn upsert_rubric_score(conn: &Connection, rs: &RubricScore) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO rubric_scores(id, submission_id, rubric_id, total, created_at) VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           submission_id = excluded.submission_id,
           rubric_id = excluded.rubric_id,
           total = excluded.total,
           created_at = excluded.created_at",
        (
            &rs.id,
            &rs.submission_id,
            &rs.rubric_id,
            rs.total,
            rs.created_at.to_rfc3339(),
        ),
    )
    .context("failed to save rubric score")?;
    conn.execute(
        "DELETE FROM criterion_scores WHERE rubric_score_id = ?",
        [&rs.id],
    )?;
    for (i, c) in rs.scores.iter().enumerate() {
        conn.execute(
            "INSERT INTO criterion_scores(rubric_score_id, criterion_id, sort_order, level, score, comment)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                &rs.id,
                &c.criterion_id,
                i as i64,
                c.level.map(i64::from),
                c.score,
                &c.comment,
            ),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_db;
    use chrono::TimeZone;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_conn(prefix: &str) -> Connection {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        open_db(&p).expect("open db")
    }

    fn seed_class(conn: &Connection) {
        conn.execute("INSERT INTO classes(id, name) VALUES('c1', 'Math 9')", [])
            .expect("class");
        conn.execute(
            "INSERT INTO students(id, last_name, first_name) VALUES('st1', 'Lee', 'Ana')",
            [],
        )
        .expect("student");
    }

    #[test]
    fn rubric_roundtrip_keeps_order_and_levels() {
        let conn = temp_conn("gradebook-store-rubric");
        let rubric = Rubric {
            id: "r1".into(),
            title: "Lab".into(),
            total_points: 20,
            criteria: vec![
                Criterion {
                    id: "k2".into(),
                    name: "Second".into(),
                    points: 10,
                    levels: vec![Level {
                        level: 1,
                        description: "weak".into(),
                        percent: 50,
                    }],
                },
                Criterion {
                    id: "k1".into(),
                    name: "First".into(),
                    points: 10,
                    levels: Vec::new(),
                },
            ],
        };
        conn.save_rubric(&rubric).expect("save");
        conn.save_rubric(&rubric).expect("save again");
        let loaded = conn.get_rubric("r1").expect("load").expect("exists");
        assert_eq!(loaded, rubric);
        assert_eq!(conn.get_rubric("missing").expect("load"), None);
    }

    #[test]
    fn submission_upsert_and_lookup() {
        let conn = temp_conn("gradebook-store-submission");
        seed_class(&conn);
        let due = Utc.with_ymd_and_hms(2026, 2, 1, 23, 59, 0).single().expect("time");
        let a = Assignment {
            id: "a1".into(),
            class_id: "c1".into(),
            title: "Quiz".into(),
            category: Some("Quizzes".into()),
            total_points: 10.0,
            weight: 2.0,
            due_date: Some(due),
            rubric_id: None,
        };
        conn.save_assignment(&a).expect("save assignment");
        assert_eq!(conn.get_assignment("a1").expect("load"), Some(a.clone()));
        assert_eq!(conn.list_assignments("c1").expect("list").len(), 1);

        let mut s = Submission::new("s1".into(), "a1".into(), "st1".into());
        conn.save_submission(&s).expect("insert");
        s.status = SubmissionStatus::Graded;
        s.score = Some(8.5);
        s.submitted_at = Some(due);
        s.attempt_count = 2;
        s.feedback_requested = true;
        conn.save_submission(&s).expect("update");

        assert_eq!(conn.get_submission("s1").expect("load"), Some(s.clone()));
        assert_eq!(conn.find_submission("a1", "st1").expect("find"), Some(s.clone()));
        assert_eq!(conn.list_class_submissions("c1").expect("list"), vec![s]);

        let dup = Submission::new("s2".into(), "a1".into(), "st1".into());
        assert!(conn.save_submission(&dup).is_err());
    }

    #[test]
    fn rubric_score_roundtrip() {
        let conn = temp_conn("gradebook-store-rubric-score");
        seed_class(&conn);
        conn.save_rubric(&Rubric {
            id: "r1".into(),
            title: "Essay".into(),
            total_points: 10,
            criteria: Vec::new(),
        })
        .expect("rubric");
        conn.save_assignment(&Assignment {
            id: "a1".into(),
            class_id: "c1".into(),
            title: "Essay".into(),
            category: None,
            total_points: 10.0,
            weight: 1.0,
            due_date: None,
            rubric_id: Some("r1".into()),
        })
        .expect("assignment");
        let mut sub = Submission::new("s1".into(), "a1".into(), "st1".into());
        sub.rubric_score_id = Some("rs1".into());

        let created_at = Utc.with_ymd_and_hms(2026, 2, 3, 10, 0, 0).single().expect("time");
        let rs = RubricScore {
            id: "rs1".into(),
            submission_id: "s1".into(),
            rubric_id: "r1".into(),
            scores: vec![
                CriterionScore {
                    criterion_id: "k1".into(),
                    level: Some(3),
                    score: 4,
                    comment: Some("solid".into()),
                },
                CriterionScore {
                    criterion_id: "k2".into(),
                    level: None,
                    score: 0,
                    comment: None,
                },
            ],
            total: 4,
            created_at,
        };
        conn.save_rubric_grade(&sub, &rs).expect("save");
        assert_eq!(conn.get_rubric_score("rs1").expect("load"), Some(rs));
    }

    fn seed_rubric_assignment(conn: &Connection) {
        seed_class(conn);
        for id in ["r1", "r2"] {
            conn.save_rubric(&Rubric {
                id: id.into(),
                title: "Essay".into(),
                total_points: 10,
                criteria: Vec::new(),
            })
            .expect("rubric");
        }
        conn.save_assignment(&Assignment {
            id: "a1".into(),
            class_id: "c1".into(),
            title: "Essay".into(),
            category: None,
            total_points: 10.0,
            weight: 1.0,
            due_date: None,
            rubric_id: Some("r1".into()),
        })
        .expect("assignment");
    }

    fn breakdown(rubric_id: &str, total: i64) -> RubricScore {
        RubricScore {
            id: "rs1".into(),
            submission_id: "s1".into(),
            rubric_id: rubric_id.into(),
            scores: vec![CriterionScore {
                criterion_id: "k1".into(),
                level: Some(4),
                score: total,
                comment: None,
            }],
            total,
            created_at: Utc.with_ymd_and_hms(2026, 2, 3, 10, 0, 0).single().expect("time"),
        }
    }

    #[test]
    fn resaving_rubric_score_repoints_it_at_the_new_rubric() {
        let conn = temp_conn("gradebook-store-rescore");
        seed_rubric_assignment(&conn);
        let mut s = Submission::new("s1".into(), "a1".into(), "st1".into());
        s.rubric_score_id = Some("rs1".into());

        conn.save_rubric_grade(&s, &breakdown("r1", 5)).expect("first");
        conn.save_rubric_grade(&s, &breakdown("r2", 10)).expect("second");

        let loaded = conn.get_rubric_score("rs1").expect("load").expect("exists");
        assert_eq!(loaded.rubric_id, "r2");
        assert_eq!(loaded.total, 10);
        assert_eq!(loaded.scores.len(), 1);
    }

    #[test]
    fn rubric_grade_writes_submission_and_breakdown_together() {
        let conn = temp_conn("gradebook-store-rubric-grade");
        seed_rubric_assignment(&conn);
        let mut s = Submission::new("s1".into(), "a1".into(), "st1".into());
        s.status = SubmissionStatus::Graded;
        s.score = Some(10.0);
        s.rubric_score_id = Some("rs1".into());

        conn.save_rubric_grade(&s, &breakdown("r1", 10)).expect("save");
        assert_eq!(conn.get_submission("s1").expect("load"), Some(s.clone()));
        assert_eq!(
            conn.get_rubric_score("rs1").expect("load").map(|rs| rs.total),
            Some(10)
        );
    }

    #[test]
    fn failed_breakdown_write_rolls_back_the_submission() {
        let conn = temp_conn("gradebook-store-rubric-grade-rollback");
        seed_rubric_assignment(&conn);
        let mut s = Submission::new("s1".into(), "a1".into(), "st1".into());
        s.status = SubmissionStatus::Graded;
        s.score = Some(10.0);
        s.rubric_score_id = Some("rs1".into());

        // Unknown rubric id trips the foreign key on rubric_scores.
        assert!(conn.save_rubric_grade(&s, &breakdown("gone", 10)).is_err());
        assert_eq!(conn.get_submission("s1").expect("load"), None);
        assert_eq!(conn.get_rubric_score("rs1").expect("load"), None);
    }
}
