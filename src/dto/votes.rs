use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dao::models::VotingStatsEntity,
    services::vote_service::{VoteAction, VoteOutcome},
};

/// Result of toggling a vote.
#[derive(Debug, Serialize, ToSchema)]
pub struct VoteResponse {
    pub action: VoteAction,
    /// Votes on the game after the toggle.
    pub vote_count: u64,
}

impl From<VoteOutcome> for VoteResponse {
    fn from(outcome: VoteOutcome) -> Self {
        Self {
            action: outcome.action,
            vote_count: outcome.vote_count,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VoteStatusResponse {
    pub voted: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MostVotedGame {
    pub title: String,
    pub votes: u64,
}

/// Aggregate voting figures. Zeros while storage is unavailable.
#[derive(Debug, Serialize, ToSchema)]
pub struct VotingStatsResponse {
    pub total_votes: u64,
    pub games_with_votes: u64,
    pub users_who_voted: u64,
    pub most_voted: Option<MostVotedGame>,
}

impl From<VotingStatsEntity> for VotingStatsResponse {
    fn from(stats: VotingStatsEntity) -> Self {
        Self {
            total_votes: stats.total_votes,
            games_with_votes: stats.games_with_votes,
            users_who_voted: stats.users_who_voted,
            most_voted: stats
                .most_voted
                .map(|(title, votes)| MostVotedGame { title, votes }),
        }
    }
}
