use crate::cache::Cache;
use crate::game::{by_ratio_desc, GameRecord, PRICE_EPSILON};
use crate::reconcile::StatsSummary;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    UnknownPrice,
    Free,
    Unplayed,
    Played,
}

pub fn categorize(game: &GameRecord) -> Category {
    match game.price {
        None => Category::UnknownPrice,
        Some(price) if price <= PRICE_EPSILON => Category::Free,
        Some(_) if game.playtime_minutes == 0 => Category::Unplayed,
        Some(_) => Category::Played,
    }
}

/// All cached games, highest ratio first.
pub fn sorted_by_ratio(cache: &Cache) -> Vec<&GameRecord> {
    let mut games: Vec<&GameRecord> = cache.records().collect();
    games.sort_by(|a, b| by_ratio_desc(a, b));
    games
}

/// Minutes still needed to reach `target_ratio`, or `None` once reached.
pub fn remaining_playtime(game: &GameRecord, target_ratio: f64) -> Option<f64> {
    let price = game.price.filter(|p| *p > PRICE_EPSILON)?;
    let remaining = price * target_ratio - f64::from(game.playtime_minutes);
    (remaining > 0.0).then_some(remaining)
}

pub fn format_minutes(minutes: f64) -> String {
    if minutes > 60.0 {
        format!("{:.2}h", minutes / 60.0)
    } else {
        format!("{minutes:.2}min")
    }
}

fn hours(minutes: u32) -> String {
    format!("{:.2}h", f64::from(minutes) / 60.0)
}

fn money(game: &GameRecord) -> String {
    match (game.price, game.currency.as_deref()) {
        (Some(price), Some(currency)) => format!("{price:.2} {currency}"),
        (Some(price), None) => format!("{price:.2}"),
        (None, _) => "?".to_string(),
    }
}

fn reason(game: &GameRecord) -> String {
    game.note
        .map_or("Not fetched yet", |note| note.describe())
        .to_string()
}

fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect();
        padded.join("  ").trim_end().to_string()
    };

    let mut out = line(headers.to_vec());
    out.push('\n');
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}

fn ratio_cell(game: &GameRecord) -> String {
    game.ratio()
        .map_or_else(|| "?".to_string(), |r| format!("{r:.2}"))
}

fn remaining_cell(game: &GameRecord, target_ratio: f64) -> String {
    remaining_playtime(game, target_ratio).map_or_else(|| "N/A".to_string(), format_minutes)
}

/// The full per-category report written to `formatted_stats.txt`.
pub fn render_report(cache: &Cache, stats: &StatsSummary, target_ratio: f64) -> String {
    let mut unknown = Vec::new();
    let mut free = Vec::new();
    let mut unplayed = Vec::new();
    let mut played = Vec::new();
    for game in sorted_by_ratio(cache) {
        match categorize(game) {
            Category::UnknownPrice => unknown.push(game),
            Category::Free => free.push(game),
            Category::Unplayed => unplayed.push(game),
            Category::Played => played.push(game),
        }
    }
    unknown.sort_by(|a, b| b.playtime_minutes.cmp(&a.playtime_minutes));
    free.sort_by(|a, b| b.playtime_minutes.cmp(&a.playtime_minutes));
    unplayed.sort_by(|a, b| {
        b.price
            .unwrap_or_default()
            .total_cmp(&a.price.unwrap_or_default())
    });

    let mut out = String::new();
    if !unknown.is_empty() {
        let rows: Vec<Vec<String>> = unknown
            .iter()
            .map(|g| vec![g.name.clone(), hours(g.playtime_minutes), reason(g)])
            .collect();
        out.push_str("Games with unknown price\n");
        out.push_str(&table(&["Name", "Playtime", "Reason"], &rows));
        out.push('\n');
    }
    if !free.is_empty() {
        let rows: Vec<Vec<String>> = free
            .iter()
            .map(|g| vec![g.name.clone(), hours(g.playtime_minutes)])
            .collect();
        out.push_str("Free games\n");
        out.push_str(&table(&["Name", "Playtime"], &rows));
        out.push('\n');
    }
    if !unplayed.is_empty() {
        let rows: Vec<Vec<String>> = unplayed
            .iter()
            .map(|g| vec![g.name.clone(), money(g), remaining_cell(g, target_ratio)])
            .collect();
        out.push_str("Unplayed games\n");
        out.push_str(&table(&["Name", "Price", "Target playtime"], &rows));
        out.push('\n');
    }
    if !played.is_empty() {
        let rows: Vec<Vec<String>> = played
            .iter()
            .map(|g| {
                vec![
                    g.name.clone(),
                    hours(g.playtime_minutes),
                    money(g),
                    ratio_cell(g),
                    remaining_cell(g, target_ratio),
                ]
            })
            .collect();
        out.push_str("Played games\n");
        out.push_str(&table(
            &["Name", "Playtime", "Price", "Ratio (min/unit)", "Remaining playtime"],
            &rows,
        ));
        out.push('\n');
    }

    out.push_str(&render_summary(stats));
    out
}

pub fn render_summary(stats: &StatsSummary) -> String {
    let ratio = |r: Option<f64>| r.map_or_else(|| "N/A".to_string(), |r| format!("{r:.2}"));

    let mut out = String::new();
    // writing to a String cannot fail
    let _ = writeln!(out, "Games : {}", stats.game_count);
    let _ = writeln!(
        out,
        "Free : {} | Unplayed : {} | Unknown price : {}",
        stats.free_count, stats.unplayed_count, stats.unknown_price_count
    );
    let _ = writeln!(out, "Mean ratio : {}", ratio(stats.average_ratio));
    let _ = writeln!(out, "Median ratio : {}", ratio(stats.median_ratio));
    let _ = writeln!(
        out,
        "Total playtime : {:.2}h",
        stats.total_playtime_minutes as f64 / 60.0
    );
    let _ = writeln!(out, "Total price : {:.2}", stats.total_spend);
    out
}

/// One game's line, for single-game mode.
pub fn render_game(game: &GameRecord, target_ratio: f64) -> String {
    let (title, table_text) = match categorize(game) {
        Category::UnknownPrice => (
            format!("Price is unknown for {}", game.name),
            table(
                &["Name", "Playtime", "Reason"],
                &[vec![game.name.clone(), hours(game.playtime_minutes), reason(game)]],
            ),
        ),
        Category::Free => (
            format!("{} is free", game.name),
            table(
                &["Name", "Playtime"],
                &[vec![game.name.clone(), hours(game.playtime_minutes)]],
            ),
        ),
        Category::Unplayed => (
            format!("{} has not been played", game.name),
            table(
                &["Name", "Price", "Target playtime"],
                &[vec![
                    game.name.clone(),
                    money(game),
                    remaining_cell(game, target_ratio),
                ]],
            ),
        ),
        Category::Played => (
            game.name.clone(),
            table(
                &["Name", "Playtime", "Price", "Ratio (min/unit)", "Remaining playtime"],
                &[vec![
                    game.name.clone(),
                    hours(game.playtime_minutes),
                    money(game),
                    ratio_cell(game),
                    remaining_cell(game, target_ratio),
                ]],
            ),
        ),
    };
    format!("{title}\n\n{table_text}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::PriceNote;
    use crate::reconcile::compute_global_stats;

    fn sample() -> Cache {
        let mut cache = Cache::new();
        cache.upsert(GameRecord::new(1, "A", 600).with_price(20.0));
        cache.upsert(GameRecord::new(2, "B", 0).with_price(10.0));
        cache.upsert(GameRecord::new(3, "C", 1200).with_price(0.0));
        cache
    }

    #[test]
    fn ratio_order_is_free_then_played_then_unplayed() {
        let cache = sample();
        let names: Vec<&str> = sorted_by_ratio(&cache)
            .iter()
            .map(|g| g.name.as_str())
            .collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }

    #[test]
    fn categories_follow_price_and_playtime() {
        assert_eq!(categorize(&GameRecord::new(1, "x", 5)), Category::UnknownPrice);
        assert_eq!(
            categorize(&GameRecord::new(1, "x", 5).with_price(0.0)),
            Category::Free
        );
        assert_eq!(
            categorize(&GameRecord::new(1, "x", 0).with_price(3.0)),
            Category::Unplayed
        );
        assert_eq!(
            categorize(&GameRecord::new(1, "x", 5).with_price(3.0)),
            Category::Played
        );
    }

    #[test]
    fn remaining_playtime_against_target() {
        let behind = GameRecord::new(1, "x", 100).with_price(10.0);
        assert_eq!(remaining_playtime(&behind, 25.0), Some(150.0));

        let done = GameRecord::new(1, "x", 300).with_price(10.0);
        assert_eq!(remaining_playtime(&done, 25.0), None);

        let free = GameRecord::new(1, "x", 0).with_price(0.0);
        assert_eq!(remaining_playtime(&free, 25.0), None);
    }

    #[test]
    fn minutes_switch_to_hours_above_an_hour() {
        assert_eq!(format_minutes(45.0), "45.00min");
        assert_eq!(format_minutes(60.0), "60.00min");
        assert_eq!(format_minutes(150.0), "2.50h");
    }

    #[test]
    fn report_has_sections_and_footer() {
        let mut cache = sample();
        let mut unknown = GameRecord::new(4, "Delisted", 90);
        unknown.note = Some(PriceNote::NoStorePage);
        cache.upsert(unknown);

        let report = render_report(&cache, &compute_global_stats(&cache), 25.0);
        assert!(report.contains("Games with unknown price"));
        assert!(report.contains("No store page"));
        assert!(report.contains("Free games"));
        assert!(report.contains("Unplayed games"));
        assert!(report.contains("Played games"));
        assert!(report.contains("Mean ratio : 30.00"));
        assert!(report.contains("Total price : 30.00"));
        // 10 * 25 minutes to go for the unplayed game
        assert!(report.contains("4.17h"));
    }

    #[test]
    fn empty_cache_renders_only_the_footer() {
        let cache = Cache::new();
        let report = render_report(&cache, &compute_global_stats(&cache), 25.0);
        assert!(report.starts_with("Games : 0"));
        assert!(report.contains("Mean ratio : N/A"));
    }

    #[test]
    fn single_game_view_names_the_category() {
        let free = GameRecord::new(3, "C", 1200).with_price(0.0);
        assert!(render_game(&free, 25.0).starts_with("C is free"));

        let mut played = GameRecord::new(1, "A", 600).with_price(20.0);
        played.currency = Some("EUR".into());
        let view = render_game(&played, 25.0);
        assert!(view.contains("20.00 EUR"));
        assert!(view.contains("30.00"));
        assert!(view.contains("N/A"));
    }

    #[test]
    fn table_columns_are_aligned() {
        let text = table(
            &["Name", "Playtime"],
            &[vec!["Long name here".into(), "1.00h".into()]],
        );
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0].find("Playtime"), lines[1].find("1.00h"));
    }
}
