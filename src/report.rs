use std::collections::HashMap;
use std::fmt::Write;

use uuid::Uuid;

use crate::models::{Assignment, Student, Topic};

#[derive(Debug, Clone)]
pub struct RankDistribution {
    pub rank: i32,
    pub count: usize,
}

/// Count placed students per rank. Off-ballot placements (no rank)
/// are reported separately.
pub fn rank_distribution(assignments: &[Assignment]) -> (Vec<RankDistribution>, usize) {
    let mut by_rank: HashMap<i32, usize> = HashMap::new();
    let mut off_ballot = 0usize;

    for assignment in assignments {
        match assignment.original_rank {
            Some(rank) => *by_rank.entry(rank).or_insert(0) += 1,
            None => off_ballot += 1,
        }
    }

    let mut distribution: Vec<RankDistribution> = by_rank
        .into_iter()
        .map(|(rank, count)| RankDistribution { rank, count })
        .collect();
    distribution.sort_by_key(|d| d.rank);
    (distribution, off_ballot)
}

pub fn build_report(
    period_name: &str,
    batch_id: &str,
    topics: &[Topic],
    students: &[Student],
    assignments: &[Assignment],
) -> String {
    let roster: HashMap<Uuid, &Student> = students.iter().map(|s| (s.id, s)).collect();

    let mut output = String::new();
    let _ = writeln!(output, "# Topic Assignment Report");
    let _ = writeln!(
        output,
        "Period {}, batch {} ({} students placed)",
        period_name,
        batch_id,
        assignments.len()
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Groups");

    for topic in topics {
        let mut members: Vec<&Assignment> = assignments
            .iter()
            .filter(|a| a.topic_id == topic.id)
            .collect();
        members.sort_by_key(|a| (a.original_rank.unwrap_or(i32::MAX), a.student_id));

        let _ = writeln!(output);
        let _ = writeln!(output, "### {} ({} members)", topic.title, members.len());
        if members.is_empty() {
            let _ = writeln!(output, "No students assigned.");
        }
        for assignment in members {
            let label = roster
                .get(&assignment.student_id)
                .map(|s| format!("{} ({})", s.full_name, s.email))
                .unwrap_or_else(|| assignment.student_id.to_string());
            match assignment.original_rank {
                Some(rank) => {
                    let _ = writeln!(output, "- {label}, choice #{rank}");
                }
                None => {
                    let _ = writeln!(output, "- {label}, not on their ballot");
                }
            }
        }
    }

    let (distribution, off_ballot) = rank_distribution(assignments);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Choice Satisfaction");

    if assignments.is_empty() {
        let _ = writeln!(output, "No assignments in this batch.");
    } else {
        for entry in &distribution {
            let _ = writeln!(
                output,
                "- choice #{}: {} student(s)",
                entry.rank, entry.count
            );
        }
        if off_ballot > 0 {
            let _ = writeln!(output, "- off-ballot placements: {off_ballot}");
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn assignment(topic_id: Uuid, rank: Option<i32>) -> Assignment {
        Assignment {
            period_id: Uuid::new_v4(),
            batch_id: "batch-1".to_string(),
            student_id: Uuid::new_v4(),
            topic_id,
            assigned_at: Utc::now(),
            original_rank: rank,
        }
    }

    #[test]
    fn distribution_counts_ranks_and_off_ballot() {
        let topic = Uuid::new_v4();
        let assignments = vec![
            assignment(topic, Some(1)),
            assignment(topic, Some(1)),
            assignment(topic, Some(2)),
            assignment(topic, None),
        ];

        let (distribution, off_ballot) = rank_distribution(&assignments);
        assert_eq!(distribution.len(), 2);
        assert_eq!(distribution[0].rank, 1);
        assert_eq!(distribution[0].count, 2);
        assert_eq!(distribution[1].rank, 2);
        assert_eq!(distribution[1].count, 1);
        assert_eq!(off_ballot, 1);
    }

    #[test]
    fn report_lists_every_group() {
        let period_id = Uuid::new_v4();
        let topics = vec![
            Topic {
                id: Uuid::new_v4(),
                period_id,
                title: "Data Commons".to_string(),
                enabled_for_ranking: true,
            },
            Topic {
                id: Uuid::new_v4(),
                period_id,
                title: "Robotics Lab".to_string(),
                enabled_for_ranking: true,
            },
        ];
        let student = Student {
            id: Uuid::new_v4(),
            full_name: "Avery Lee".to_string(),
            email: "avery.lee@groupscholar.com".to_string(),
        };
        let mut placed = assignment(topics[0].id, Some(1));
        placed.student_id = student.id;

        let report = build_report("spring-2026", "batch-1", &topics, &[student], &[placed]);
        assert!(report.contains("### Data Commons (1 members)"));
        assert!(report.contains("### Robotics Lab (0 members)"));
        assert!(report.contains("Avery Lee (avery.lee@groupscholar.com), choice #1"));
        assert!(report.contains("- choice #1: 1 student(s)"));
    }
}
