//! fbref.com scraper for per-player match statistics
//!
//! Two page types: a team's season match log (to harvest match-report
//! links) and a match report (two `stats_table` player tables, one per
//! team). fbref rejects default HTTP clients, so requests carry a
//! browser-like header set and a politeness delay.

use crate::features::assemble::coerce_numeric;
use crate::{
    Age, PlayerMatchRecord, PlayerMatchSet, Position, Result, StatSchema, XgoalsError,
};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Placeholder for text cells that arrive empty
const UNDEF: &str = "undef";

/// A team to scrape, loaded from teams.json
#[derive(Debug, Clone, Deserialize)]
pub struct TeamEntry {
    pub code: String,
    pub name: String,
}

/// Load the team roster file (code + URL name per team)
pub fn load_teams<P: AsRef<Path>>(path: P) -> Result<Vec<TeamEntry>> {
    let content = std::fs::read_to_string(path.as_ref())?;
    serde_json::from_str(&content).map_err(|e| XgoalsError::Parse(e.to_string()))
}

/// Scraper for fbref.com
pub struct FbrefScraper {
    client: reqwest::blocking::Client,
    request_delay: Duration,
}

impl FbrefScraper {
    pub fn new(request_delay: Duration) -> Result<Self> {
        use reqwest::header::{HeaderMap, HeaderValue};

        let mut headers = HeaderMap::new();
        headers.insert(
            "Accept",
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert("Accept-Language", HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
        headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
        headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
        headers.insert("Sec-Fetch-Site", HeaderValue::from_static("none"));

        let client = reqwest::blocking::Client::builder()
            .user_agent(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
            )
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(FbrefScraper {
            client,
            request_delay,
        })
    }

    fn get_html(&self, url: &str) -> Result<String> {
        std::thread::sleep(self.request_delay);
        log::debug!("Fetching {}", url);
        let response = self.client.get(url).send()?;
        if !response.status().is_success() {
            return Err(XgoalsError::Scraper(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        Ok(response.text()?)
    }

    /// Match-report links from a team's season match log page
    pub fn team_match_links(&self, code: &str, name: &str, season: &str) -> Result<Vec<String>> {
        let url = format!(
            "https://fbref.com/en/squads/{}/{}/matchlogs/all_comps/schedule/\
             {}-Scores-and-Fixtures-All-Competitions",
            code, season, name
        );
        let html = self.get_html(&url)?;
        Ok(Self::parse_match_links(&html))
    }

    /// Extract match links from a match-log page (first cell of each row)
    pub fn parse_match_links(html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let table_sel = Selector::parse("table.stats_table").unwrap();
        let row_sel = Selector::parse("tr").unwrap();
        let cell_sel = Selector::parse("th, td").unwrap();
        let link_sel = Selector::parse("a").unwrap();

        let mut links = Vec::new();
        let Some(table) = document.select(&table_sel).next() else {
            return links;
        };
        for row in table.select(&row_sel).skip(1) {
            let Some(first_cell) = row.select(&cell_sel).next() else {
                continue;
            };
            if let Some(link) = first_cell.select(&link_sel).next() {
                if let Some(href) = link.value().attr("href") {
                    if href.contains("/matches/") {
                        links.push(href.to_string());
                    }
                }
            }
        }
        links.sort();
        links.dedup();
        links
    }

    /// Fetch a match report and parse both teams' player stat tables
    pub fn match_player_records(&self, match_url: &str) -> Result<PlayerMatchSet> {
        let url = if match_url.contains("fbref.com") {
            match_url.to_string()
        } else {
            format!("https://fbref.com{}", match_url)
        };
        let match_id = Self::match_id_from_url(&url).ok_or_else(|| {
            XgoalsError::Scraper(format!("no match id in url: {}", url))
        })?;
        let html = self.get_html(&url)?;
        Self::parse_match_page(&html, &match_id)
    }

    /// The hex identifier segment after `/matches/` in a report URL
    pub fn match_id_from_url(url: &str) -> Option<String> {
        let mut segments = url.split('/').skip_while(|s| *s != "matches");
        segments.next()?; // "matches"
        let id = segments.next()?;
        if id.is_empty() {
            None
        } else {
            Some(id.to_string())
        }
    }

    /// Parse a match report page into player rows for both teams
    pub fn parse_match_page(html: &str, match_id: &str) -> Result<PlayerMatchSet> {
        let document = Html::parse_document(html);
        let container_sel = Selector::parse(r#"div[id^="all_player_stats"]"#).unwrap();
        let table_sel = Selector::parse("table.stats_table").unwrap();

        let mut schema: Option<StatSchema> = None;
        let mut records = Vec::new();

        for container in document.select(&container_sel) {
            let Some(table) = container.select(&table_sel).next() else {
                log::warn!("player stats container without a stats_table");
                continue;
            };
            let (table_schema, mut table_records) = Self::parse_player_table(table, match_id)?;
            match &schema {
                None => schema = Some(table_schema),
                Some(existing) => {
                    if *existing != table_schema {
                        return Err(XgoalsError::Scraper(format!(
                            "stat columns differ between team tables in match {}",
                            match_id
                        )));
                    }
                }
            }
            records.append(&mut table_records);
        }

        let schema = schema.ok_or_else(|| {
            XgoalsError::Scraper(format!("no player stat tables found in match {}", match_id))
        })?;
        Ok(PlayerMatchSet::new(schema, records))
    }

    /// One team's player table: two-level header, one row per player
    fn parse_player_table(
        table: ElementRef,
        match_id: &str,
    ) -> Result<(StatSchema, Vec<PlayerMatchRecord>)> {
        let caption_sel = Selector::parse("caption").unwrap();
        let head_row_sel = Selector::parse("thead tr").unwrap();
        let th_sel = Selector::parse("th").unwrap();
        let body_row_sel = Selector::parse("tbody tr").unwrap();
        let cell_sel = Selector::parse("th, td").unwrap();

        let team = table
            .select(&caption_sel)
            .next()
            .map(|c| cell_text(c))
            .map(|t| {
                t.split(" Player Stats")
                    .next()
                    .unwrap_or(&t)
                    .trim()
                    .to_string()
            })
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNDEF.to_string());

        // Merge the two header rows: the over-header spans (colspan) name
        // stat groups, the last row holds the leaf names.
        let head_rows: Vec<_> = table.select(&head_row_sel).collect();
        let leaf_row = head_rows
            .last()
            .ok_or_else(|| XgoalsError::Scraper("player table has no header".into()))?;
        let mut groups: Vec<String> = Vec::new();
        if head_rows.len() > 1 {
            for th in head_rows[0].select(&th_sel) {
                let span: usize = th
                    .value()
                    .attr("colspan")
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(1);
                let group = cell_text(th);
                for _ in 0..span {
                    groups.push(group.clone());
                }
            }
        }
        let leaves: Vec<String> = leaf_row.select(&th_sel).map(|th| cell_text(th)).collect();

        // Column roles: identity columns are pulled into typed fields,
        // everything else becomes a named numeric stat.
        #[derive(Clone, Copy, PartialEq)]
        enum Role {
            Player,
            Pos,
            Age,
            Skip,
            Stat,
        }
        let mut roles = Vec::with_capacity(leaves.len());
        let mut stat_names: Vec<String> = Vec::new();
        for (i, leaf) in leaves.iter().enumerate() {
            let role = match leaf.to_lowercase().as_str() {
                "player" => Role::Player,
                "pos" => Role::Pos,
                "age" => Role::Age,
                "nation" => Role::Skip,
                _ => Role::Stat,
            };
            if role == Role::Stat {
                let group = groups.get(i).map(String::as_str).unwrap_or("");
                stat_names.push(unique_stat_name(&stat_names, group, leaf));
            }
            roles.push(role);
        }
        let schema = StatSchema::new(stat_names)?;

        let mut records = Vec::new();
        for row in table.select(&body_row_sel) {
            let cells: Vec<_> = row.select(&cell_sel).collect();
            if cells.len() != roles.len() {
                continue;
            }

            let mut player = String::new();
            let mut pos = Position::Other;
            let mut age = None;
            let mut values = Vec::with_capacity(schema.len());
            for (cell, role) in cells.iter().zip(&roles) {
                let text = cell_text(*cell);
                match role {
                    Role::Player => player = text,
                    Role::Pos => pos = Position::parse(&text),
                    Role::Age => age = Age::parse(&text).ok(),
                    Role::Skip => {}
                    Role::Stat => values.push(coerce_numeric(&text)),
                }
            }

            // Per-team footer rows look like "16 Players"
            if player.is_empty() {
                player = UNDEF.to_string();
            }
            if player.contains("Players") {
                continue;
            }
            let Some(age) = age else {
                log::debug!("skipping {} in {}: unparseable age", player, match_id);
                continue;
            };

            records.push(PlayerMatchRecord {
                player,
                match_id: match_id.to_string(),
                team: team.clone(),
                pos,
                age,
                values,
            });
        }

        Ok((schema, records))
    }
}

/// Align one page's records onto the canonical stat schema by name.
/// Stats the page lacks become missing; stats the target lacks are dropped.
pub fn align_to_schema(set: PlayerMatchSet, target: &StatSchema) -> PlayerMatchSet {
    if set.schema == *target {
        return set;
    }
    let mapping: Vec<Option<usize>> = target
        .names()
        .iter()
        .map(|name| set.schema.index_of(name))
        .collect();
    let records = set
        .records
        .into_iter()
        .map(|r| {
            let values = mapping
                .iter()
                .map(|src| src.and_then(|i| r.values[i]))
                .collect();
            PlayerMatchRecord { values, ..r }
        })
        .collect();
    PlayerMatchSet::new(target.clone(), records)
}

fn cell_text(cell: ElementRef) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Stat column name: lowercased leaf with `%` -> `_perc`, `.`/spaces/`+`
/// -> `_`, `#` -> `player_number`; group-prefixed only when the bare leaf
/// name already exists in this table.
fn unique_stat_name(existing: &[String], group: &str, leaf: &str) -> String {
    let base = clean_name(leaf);
    if !existing.iter().any(|n| *n == base) {
        return base;
    }
    let prefixed = format!("{}_{}", clean_name(group), base);
    if !existing.iter().any(|n| *n == prefixed) {
        return prefixed;
    }
    let mut i = 2;
    loop {
        let candidate = format!("{}_{}", prefixed, i);
        if !existing.iter().any(|n| *n == candidate) {
            return candidate;
        }
        i += 1;
    }
}

fn clean_name(name: &str) -> String {
    if name.trim() == "#" {
        return "player_number".to_string();
    }
    name.trim()
        .to_lowercase()
        .replace('%', "_perc")
        .replace(['.', ' ', '+', '-', '/'], "_")
}
