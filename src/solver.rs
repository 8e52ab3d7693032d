use async_trait::async_trait;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AssignError;
use crate::models::{SolverRequest, SolverResult};

/// The optimizer boundary. `submit` hands the compiled request off;
/// the result arrives later through the callback surface (`complete` /
/// `fail` on the job), never as a return value here.
#[async_trait]
pub trait Solver: Send + Sync {
    async fn submit(&self, job_id: Uuid, request: &SolverRequest) -> anyhow::Result<()>;
}

/// Production hand-off: POST the request to the optimizer service,
/// which reports back via the completion callback.
pub struct HttpSolver {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSolver {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl Solver for HttpSolver {
    async fn submit(&self, job_id: Uuid, request: &SolverRequest) -> anyhow::Result<()> {
        let url = format!("{}/jobs/{}", self.endpoint.trim_end_matches('/'), job_id);
        let response = self.client.post(&url).json(request).send().await?;
        response.error_for_status()?;
        tracing::info!(%job_id, "submitted request to solver");
        Ok(())
    }
}

/// Content hash for a result payload, so retried deliveries of the
/// same optimizer run can be told apart from a genuinely new result.
pub fn hash_result(result: &SolverResult) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(result).unwrap_or_default());
    format!("{:x}", hasher.finalize())
}

/// Deterministic seat-filling stand-in for the real optimizer: fills
/// groups in index order while honoring sizes and exclude pairs. Used
/// by the local run path and by tests; it makes no optimality claim.
pub struct GreedySolver;

impl GreedySolver {
    pub fn solve(request: &SolverRequest) -> Result<SolverResult, AssignError> {
        let sizes: Vec<usize> = request.groups.iter().map(|g| g.size).collect();
        let total: usize = sizes.iter().sum();
        if total != request.num_students {
            return Err(AssignError::GroupSizeMismatch {
                expected: request.num_students,
                actual: total,
            });
        }

        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); sizes.len()];
        for student in 0..request.num_students {
            let mut placed = false;
            for (g, members) in groups.iter_mut().enumerate() {
                if members.len() >= sizes[g] {
                    continue;
                }
                let blocked = request.exclude.iter().any(|[a, b]| {
                    (*a == student && members.contains(b))
                        || (*b == student && members.contains(a))
                });
                if blocked {
                    continue;
                }
                members.push(student);
                placed = true;
                break;
            }
            if !placed {
                // Every open group held an excluded partner; take the
                // first open seat rather than leave the student out.
                let fallback = groups
                    .iter_mut()
                    .enumerate()
                    .find(|(g, members)| members.len() < sizes[*g]);
                match fallback {
                    Some((_, members)) => members.push(student),
                    None => {
                        return Err(AssignError::MalformedResult(
                            "greedy placement ran out of seats".into(),
                        ))
                    }
                }
            }
        }

        Ok(SolverResult { groups })
    }
}

#[async_trait]
impl Solver for GreedySolver {
    async fn submit(&self, job_id: Uuid, _request: &SolverRequest) -> anyhow::Result<()> {
        // Local solves run synchronously after job creation; there is
        // nothing to hand off.
        tracing::debug!(%job_id, "greedy solver accepts request inline");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WireGroup;
    use std::collections::BTreeMap;

    fn request(sizes: &[usize], exclude: Vec<[usize; 2]>) -> SolverRequest {
        SolverRequest {
            num_students: sizes.iter().sum(),
            num_groups: sizes.len(),
            groups: sizes
                .iter()
                .enumerate()
                .map(|(id, size)| WireGroup {
                    id,
                    size: *size,
                    criteria: BTreeMap::new(),
                })
                .collect(),
            exclude,
            ranking_percentage: None,
            max_time_in_seconds: None,
        }
    }

    #[test]
    fn fills_every_seat_exactly_once() {
        let result = GreedySolver::solve(&request(&[3, 3], Vec::new())).unwrap();
        assert_eq!(result.groups[0].len(), 3);
        assert_eq!(result.groups[1].len(), 3);

        let mut all: Vec<usize> = result.groups.concat();
        all.sort();
        assert_eq!(all, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn respects_exclude_pairs_when_possible() {
        let result = GreedySolver::solve(&request(&[2, 2], vec![[0, 1]])).unwrap();
        for members in &result.groups {
            assert!(!(members.contains(&0) && members.contains(&1)));
        }
    }

    #[test]
    fn rejects_size_mismatch() {
        let mut req = request(&[3, 3], Vec::new());
        req.num_students = 5;
        assert!(matches!(
            GreedySolver::solve(&req),
            Err(AssignError::GroupSizeMismatch { .. })
        ));
    }

    #[test]
    fn result_hash_is_content_addressed() {
        let a = SolverResult {
            groups: vec![vec![0, 1], vec![2]],
        };
        let b = SolverResult {
            groups: vec![vec![0, 1], vec![2]],
        };
        let c = SolverResult {
            groups: vec![vec![2], vec![0, 1]],
        };
        assert_eq!(hash_result(&a), hash_result(&b));
        assert_ne!(hash_result(&a), hash_result(&c));
        assert_eq!(hash_result(&a).len(), 64);
    }
}
