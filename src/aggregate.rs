use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::models::{
    AggregateRow, FacultyAssignment, Question, QuestionSummary, RatingBand, Scope,
    SubmissionRecord,
};
use crate::scores::{expand_scores, MAX_SCORE};

#[derive(Debug, Default)]
struct GroupTotals {
    responses: usize,
    sums: Vec<f64>,
    counts: Vec<usize>,
}

impl GroupTotals {
    fn new(width: usize) -> Self {
        Self {
            responses: 0,
            sums: vec![0.0; width],
            counts: vec![0; width],
        }
    }

    fn add(&mut self, slots: &[Option<u8>]) {
        self.responses += 1;
        for (i, slot) in slots.iter().enumerate() {
            if let Some(value) = slot {
                self.sums[i] += *value as f64;
                self.counts[i] += 1;
            }
        }
    }

    fn averages(&self) -> Vec<Option<f64>> {
        self.sums
            .iter()
            .zip(&self.counts)
            .map(|(sum, count)| {
                if *count == 0 {
                    None
                } else {
                    Some(sum / *count as f64)
                }
            })
            .collect()
    }
}

pub fn active_questions(questions: &[Question]) -> Vec<&Question> {
    let mut active: Vec<&Question> = questions.iter().filter(|q| q.active).collect();
    active.sort_by_key(|q| q.order);
    active
}

/// Number of scores a new submission must carry.
pub fn catalog_width(questions: &[Question]) -> usize {
    active_questions(questions).len()
}

/// Builds one row per roster entry in `scope` that has at least one submission.
///
/// Groups are keyed by exact `(faculty_name, subject)`. Rows come back in
/// roster order; ranking is left to the caller.
pub fn aggregate_scope(
    scope: &Scope,
    questions: &[Question],
    roster: &[FacultyAssignment],
    submissions: &[SubmissionRecord],
) -> Vec<AggregateRow> {
    let width = active_questions(questions).len();
    let mut groups: HashMap<(&str, &str), GroupTotals> = HashMap::new();

    for submission in submissions {
        if !scope.contains(&submission.branch, submission.section.as_deref()) {
            continue;
        }
        let slots = expand_scores(&submission.scores, width);
        groups
            .entry((submission.faculty_name.as_str(), submission.subject.as_str()))
            .or_insert_with(|| GroupTotals::new(width))
            .add(&slots);
    }

    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut rows = Vec::new();

    for assignment in roster {
        if !scope.contains(&assignment.branch, assignment.section.as_deref()) {
            continue;
        }
        let key = (assignment.faculty_name.as_str(), assignment.subject.as_str());
        if !seen.insert(key) {
            continue;
        }
        let Some(totals) = groups.get(&key) else {
            continue;
        };

        let averages = totals.averages();
        let overall = mean_present(&averages);

        rows.push(AggregateRow {
            faculty_name: assignment.faculty_name.clone(),
            subject: assignment.subject.clone(),
            department: assignment.department.clone(),
            response_count: totals.responses,
            per_question_avg: averages.iter().map(|a| a.map(round2)).collect(),
            overall_avg: overall.map(round2),
            overall_pct: overall.map(percentage),
            band: RatingBand::from_average(overall),
        });
    }

    rows
}

/// Mean of the values that are present; `None` when nothing is.
pub fn mean_present(values: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        None
    } else {
        Some(present.iter().sum::<f64>() / present.len() as f64)
    }
}

pub fn percentage(avg: f64) -> f64 {
    round1(avg / MAX_SCORE as f64 * 100.0)
}

pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Section-level average per question, taken across faculty rows.
pub fn question_summaries(questions: &[Question], rows: &[AggregateRow]) -> Vec<QuestionSummary> {
    active_questions(questions)
        .into_iter()
        .enumerate()
        .map(|(i, question)| {
            let column: Vec<Option<f64>> = rows
                .iter()
                .map(|row| row.per_question_avg.get(i).copied().flatten())
                .collect();
            QuestionSummary {
                index: i + 1,
                text: question.text.clone(),
                average: mean_present(&column).map(round2),
            }
        })
        .collect()
}

fn by_overall_desc(a: &AggregateRow, b: &AggregateRow) -> Ordering {
    match (a.overall_avg, b.overall_avg) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Splits rows into the best and worst `n` by overall average.
///
/// Both halves keep descending order; unrated rows sort last. With fewer
/// than `2n` rows the halves overlap, matching a head/tail view.
pub fn rank(rows: &[AggregateRow], n: usize) -> (Vec<AggregateRow>, Vec<AggregateRow>) {
    let mut sorted = rows.to_vec();
    sorted.sort_by(by_overall_desc);
    let top = sorted.iter().take(n).cloned().collect();
    let bottom = sorted[sorted.len().saturating_sub(n)..].to_vec();
    (top, bottom)
}

/// Faculty x question matrix of averages, in row order.
pub fn rating_matrix(rows: &[AggregateRow]) -> Vec<Vec<Option<f64>>> {
    rows.iter().map(|row| row.per_question_avg.clone()).collect()
}
