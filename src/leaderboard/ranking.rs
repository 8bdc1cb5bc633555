use super::LeaderboardEntry;

/// Stable sort by score, highest first. Equal scores keep their relative order.
pub fn sort_by_score(entries: &mut [LeaderboardEntry]) {
    entries.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Rank by sorted position: 1, 2, 3, ... regardless of ties.
pub fn assign_positions(sorted: &mut [LeaderboardEntry]) {
    for (i, entry) in sorted.iter_mut().enumerate() {
        entry.rank = i as u32 + 1;
    }
}

/// Competition ranking over entries already sorted by score: tied scores share
/// `1 + number of strictly higher scores`, and the next rank skips accordingly.
pub fn assign_competition_ranks(sorted: &mut [LeaderboardEntry]) {
    let mut previous: Option<(f64, u32)> = None;
    for (i, entry) in sorted.iter_mut().enumerate() {
        let rank = match previous {
            Some((score, rank)) if score == entry.score => rank,
            _ => i as u32 + 1,
        };
        entry.rank = rank;
        previous = Some((entry.score, rank));
    }
}
