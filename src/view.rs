//! Presentation model for the voting board.
//!
//! Fixed entries render first in their hardcoded order and carry no vote
//! control. Community entries follow, sorted by identifier, each with its
//! share of the progress bar relative to the leading community entry.

use std::fmt::Write as _;

use serde::Serialize;

use crate::game::{Collection, FIXED_GAME_IDS};
use crate::identity::VoteState;

const BAR_WIDTH: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixedCard {
    pub id: String,
    /// Stored name, or the uppercased id while the entry is missing.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommunityRow {
    pub id: String,
    pub name: String,
    pub votes: u64,
    /// This client's current vote.
    pub selected: bool,
    /// `votes / denominator * 100`.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Board {
    pub fixed: Vec<FixedCard>,
    pub community: Vec<CommunityRow>,
    pub has_voted: bool,
    pub denominator: u64,
}

impl Board {
    #[must_use]
    pub fn build(games: &Collection, vote: &VoteState) -> Self {
        let fixed = FIXED_GAME_IDS
            .iter()
            .map(|id| FixedCard {
                id: (*id).to_string(),
                name: games.get(id).map_or_else(|| id.to_uppercase(), |g| g.name.clone()),
            })
            .collect();

        let denominator = games.progress_denominator();
        #[allow(clippy::cast_precision_loss)]
        let community = games
            .community()
            .map(|(id, game)| CommunityRow {
                id: id.to_string(),
                name: game.name.clone(),
                votes: game.votes,
                selected: vote.is_voted_for(id),
                percentage: game.votes as f64 / denominator as f64 * 100.0,
            })
            .collect();

        Self { fixed, community, has_voted: vote.has_voted(), denominator }
    }

    /// Plain-text rendering for terminals.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "OFFICIAL");
        for card in &self.fixed {
            let _ = writeln!(out, "  {}", card.name);
        }

        let _ = writeln!(out, "COMMUNITY");
        if self.community.is_empty() {
            let _ = writeln!(out, "  (no entries yet)");
        }
        for row in &self.community {
            let marker = if row.selected { '>' } else { ' ' };
            let _ = writeln!(
                out,
                "{marker} {:<20} {:>5} VOTES [{}] {:>3.0}%  {}",
                row.name,
                row.votes,
                bar(row.percentage),
                row.percentage,
                row.id
            );
        }
        out
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn bar(percentage: f64) -> String {
    let filled = ((percentage / 100.0) * BAR_WIDTH as f64).round().clamp(0.0, BAR_WIDTH as f64) as usize;
    format!("{}{}", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

#[cfg(test)]
#[path = "view_test.rs"]
mod tests;
