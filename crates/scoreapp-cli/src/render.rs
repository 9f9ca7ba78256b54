//! Plain-text rendering of races, stats and connection state

use std::fmt::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use scoreapp_core::{
    AnnotatedCrossing, BarrierId, ConnectionState, CrossingTeam, FullRace, Millis,
    RaceComputation, RaceStats, TeamStats,
};

/// Shown in place of a time that is not known yet
pub const UNKNOWN_TIME: &str = "--:--.--";

/// Current wall-clock time in unix milliseconds
pub fn now_millis() -> Millis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as Millis)
        .unwrap_or_default()
}

/// Format a duration as `MM:SS.cc`; negative values are unknown
pub fn format_millis(millis: Millis) -> String {
    if millis < 0 {
        return UNKNOWN_TIME.to_string();
    }
    let minutes = millis / 60_000;
    let seconds = (millis / 1_000) % 60;
    let centis = (millis / 10) % 100;
    format!("{:02}:{:02}.{:02}", minutes, seconds, centis)
}

fn format_optional(millis: Option<Millis>) -> String {
    millis.map_or_else(|| UNKNOWN_TIME.to_string(), format_millis)
}

fn team_label(race: &FullRace, team: CrossingTeam) -> String {
    let named = match team {
        CrossingTeam::B => race.team_b.as_ref(),
        _ => race.team_a.as_ref(),
    };
    match (named, team) {
        (Some(team), _) if !team.name.is_empty() => team.name.clone(),
        (_, CrossingTeam::B) => "Team B".to_string(),
        _ => "Team A".to_string(),
    }
}

/// One line summary of a team
pub fn render_team(label: &str, stats: &TeamStats, now: Millis) -> String {
    format!(
        "{:<16} laps {:>3}  best {}  lap {}  total {}",
        label,
        stats.num_laps,
        format_optional(stats.best_lap()),
        format_optional(stats.current_lap_elapsed(now)),
        format_optional(stats.elapsed(now)),
    )
}

fn render_crossing(crossing: &AnnotatedCrossing, start: Option<Millis>) -> String {
    let annotation = &crossing.annotation;
    let mut tags = Vec::new();
    if annotation.start {
        tags.push("start".to_string());
    }
    if let Some(lap) = annotation.lap {
        tags.push(format!("lap {} {}", lap.number, format_millis(lap.time)));
    }
    if let Some(checkpoint) = annotation.checkpoint {
        tags.push(format!(
            "cp {}.{} {}",
            checkpoint.lap_number,
            checkpoint.number,
            format_millis(checkpoint.time)
        ));
    }
    if annotation.out_of_order {
        tags.push("out of order".to_string());
    }
    if annotation.excluded {
        tags.push("excluded".to_string());
    }
    if crossing.crossing.ignored {
        tags.push("ignored".to_string());
    }
    if crossing.crossing.interrupted {
        tags.push("interrupted".to_string());
    }

    let offset = start.map_or_else(
        || UNKNOWN_TIME.to_string(),
        |start| format_millis(crossing.crossing.time.saturating_sub(start)),
    );
    format!(
        "  #{:<6} barrier {:<3} {}  {}",
        crossing.crossing.id,
        crossing.crossing.barrier_id,
        offset,
        tags.join(", ")
    )
    .trim_end()
    .to_string()
}

/// Full text view of a race revision
pub fn render_race(race: &FullRace, computation: &RaceComputation, now: Millis) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Race {} [{}] {} (round {}, revision {})",
        race.id, race.race_type, race.state, race.round, race.updated_at
    );

    let start = match &computation.stats {
        RaceStats::TimeTrial(stats) => {
            let _ = writeln!(out, "{}", render_team(&team_label(race, CrossingTeam::A), stats, now));
            stats.start()
        }
        RaceStats::HeadToHead { team_a, team_b } => {
            let _ = writeln!(out, "{}", render_team(&team_label(race, CrossingTeam::A), team_a, now));
            let _ = writeln!(out, "{}", render_team(&team_label(race, CrossingTeam::B), team_b, now));
            match (team_a.start(), team_b.start()) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            }
        }
    };

    if let Some(duration) = race.fixed_time_duration() {
        let _ = writeln!(out, "Time limit {}", format_millis(duration));
    }

    if !computation.crossings.is_empty() {
        let _ = writeln!(out, "Crossings:");
        for crossing in &computation.crossings {
            let _ = writeln!(out, "{}", render_crossing(crossing, start));
        }
    }
    out
}

pub fn render_state(state: &ConnectionState) -> String {
    format!("Live feed: {}", state)
}

pub fn render_barriers(barriers: &[BarrierId]) -> String {
    if barriers.is_empty() {
        return "Online barriers: none".to_string();
    }
    let ids: Vec<String> = barriers.iter().map(|id| id.to_string()).collect();
    format!("Online barriers: {}", ids.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoreapp_core::{compute_race_stats, Crossing, Race, Team};

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0), "00:00.00");
        assert_eq!(format_millis(8_000), "00:08.00");
        assert_eq!(format_millis(61_234), "01:01.23");
        assert_eq!(format_millis(75 * 60_000), "75:00.00");
        assert_eq!(format_millis(-1), UNKNOWN_TIME);
    }

    #[test]
    fn test_unknown_team_renders_placeholders() {
        let line = render_team("Team A", &TeamStats::unknown(), 10_000);
        assert!(line.contains("laps   0"));
        assert_eq!(line.matches(UNKNOWN_TIME).count(), 3);
    }

    #[test]
    fn test_time_trial_view() {
        let mut race = Race::time_trial(3, 1);
        race.team_a = Some(Team {
            id: 1,
            updated_at: None,
            name: "Blue".to_string(),
        });
        let race = FullRace::new(
            race,
            vec![
                Crossing::new(1, 1_000, 1, CrossingTeam::Unset),
                Crossing::new(2, 9_000, 1, CrossingTeam::Unset),
            ],
        );
        let computation = compute_race_stats(&race);
        let text = render_race(&race, &computation, 12_000);

        assert!(text.starts_with("Race 3 [time_trial] running"));
        assert!(text.contains("Blue"));
        assert!(text.contains("best 00:08.00"));
        assert!(text.contains("#1      barrier 1   00:00.00  start"));
        assert!(text.contains("lap 1 00:08.00"));
    }

    #[test]
    fn test_barriers_and_state() {
        assert_eq!(render_barriers(&[]), "Online barriers: none");
        assert_eq!(render_barriers(&[1, 4]), "Online barriers: 1, 4");
        assert_eq!(render_state(&ConnectionState::NoUrl), "Live feed: no_url");
    }
}
