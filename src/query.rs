//! This module is about building the GraphQL documents sent to the [Warcraft Logs API](https://www.warcraftlogs.com/v2-api-docs/warcraft/).
//!
//! Documents are assembled as a tree of [Field]s and rendered by a single function, so that the text is identical for identical requests.
//! Caller-provided text (report codes, names, server slugs and regions) never enters the query text: it is always bound as a GraphQL variable.
//! Only numeric ids and fixed enum tags are written inline.

use serde::Serialize;
use std::str::FromStr;

/// A GraphQL request body, ready to be posted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueryDocument {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Value>,
}

/// A required part of a request was empty.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("{0} is required")]
    MissingField(&'static str),
}

/// The pre-aggregated tables that can be requested for a set of fights.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    DamageDone,
    DamageTaken,
    Healing,
    Casts,
    Buffs,
    Debuffs,
}

impl DataType {
    pub const ALL: [DataType; 6] = [
        DataType::DamageDone,
        DataType::DamageTaken,
        DataType::Healing,
        DataType::Casts,
        DataType::Buffs,
        DataType::Debuffs,
    ];

    /// The tag of this data type in the GraphQL schema.
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::DamageDone => "DamageDone",
            DataType::DamageTaken => "DamageTaken",
            DataType::Healing => "Healing",
            DataType::Casts => "Casts",
            DataType::Buffs => "Buffs",
            DataType::Debuffs => "Debuffs",
        }
    }
}

/// The string was not one of the [DataType] tags.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Invalid dataType. Must be one of: DamageDone, DamageTaken, Healing, Casts, Buffs, Debuffs")]
pub struct UnknownDataType;

impl FromStr for DataType {
    type Err = UnknownDataType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL.into_iter().find(|t| t.as_str() == s).ok_or(UnknownDataType)
    }
}

/// Which fights of a report should be included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FightFilter {
    /// Fights overlapping a window of report-relative milliseconds.
    Window { start_time: i64, end_time: i64 },
    /// Fights with the given ids.
    Fights(Vec<i64>),
}

/// Parameters of a report overview lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportRequest {
    pub code: String,
    window: Option<(i64, i64)>,
    fight_ids: Vec<i64>,
}

impl ReportRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into(), ..Self::default() }
    }

    /// Restrict the fights to a time window.
    pub fn window(mut self, start_time: i64, end_time: i64) -> Self {
        self.window = Some((start_time, end_time));
        self
    }

    /// Restrict the fights to an explicit id list.
    pub fn fights(mut self, fight_ids: Vec<i64>) -> Self {
        self.fight_ids = fight_ids;
        self
    }

    /// The single filter that will be applied: the time window takes precedence over the id list, and an empty list is no filter at all.
    pub fn fight_filter(&self) -> Option<FightFilter> {
        match (self.window, self.fight_ids.is_empty()) {
            (Some((start_time, end_time)), _) => Some(FightFilter::Window { start_time, end_time }),
            (None, false) => Some(FightFilter::Fights(self.fight_ids.clone())),
            (None, true) => None,
        }
    }
}

/// A character or a guild, identified by name and home server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerEntity {
    pub name: String,
    pub server_slug: String,
    pub server_region: String,
}

/// A value given to a field argument.
#[derive(Clone, Debug, PartialEq)]
enum Arg {
    Int(i64),
    IntList(Vec<i64>),
    /// A schema enum tag, written bare.
    Enum(&'static str),
    /// A fixed string, written as a quoted literal.
    Literal(&'static str),
    /// A reference to an operation variable.
    Variable(&'static str),
}

/// A field of the selection tree, with its arguments and sub-selection.
#[derive(Clone, Debug, PartialEq)]
struct Field {
    name: &'static str,
    args: Vec<(&'static str, Arg)>,
    selection: Vec<Field>,
}

impl Field {
    fn new(name: &'static str) -> Self {
        Self { name, args: Vec::new(), selection: Vec::new() }
    }

    fn arg(mut self, name: &'static str, value: Arg) -> Self {
        self.args.push((name, value));
        self
    }

    fn select(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.selection.extend(fields);
        self
    }

    fn render(&self, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        out.push_str(&indent);
        out.push_str(self.name);
        if !self.args.is_empty() {
            let args: Vec<String> = self.args.iter().map(|(name, value)| format!("{}: {}", name, render_arg(value))).collect();
            out.push_str(&format!("({})", args.join(", ")));
        }
        if self.selection.is_empty() {
            out.push('\n');
            return
        }
        out.push_str(" {\n");
        for field in &self.selection {
            field.render(depth + 1, out);
        }
        out.push_str(&indent);
        out.push_str("}\n");
    }
}

fn render_arg(value: &Arg) -> String {
    match value {
        Arg::Int(n) => n.to_string(),
        Arg::IntList(ns) => format!("[{}]", ns.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(", ")),
        Arg::Enum(tag) => tag.to_string(),
        // JSON string escaping is valid GraphQL string syntax.
        Arg::Literal(text) => serde_json::Value::String(text.to_string()).to_string(),
        Arg::Variable(name) => format!("${name}"),
    }
}

/// Fields without arguments nor sub-selections.
fn leaves(names: &[&'static str]) -> Vec<Field> {
    names.iter().copied().map(Field::new).collect()
}

/// A named query operation under construction.
struct Operation {
    name: &'static str,
    definitions: Vec<(&'static str, &'static str)>,
    variables: serde_json::Map<String, serde_json::Value>,
}

impl Operation {
    fn new(name: &'static str) -> Self {
        Self { name, definitions: Vec::new(), variables: serde_json::Map::new() }
    }

    /// Declare a `String!` variable bound to `value`, and get the argument referring to it.
    fn string(&mut self, name: &'static str, value: &str) -> Arg {
        self.definitions.push((name, "String!"));
        self.variables.insert(name.to_string(), serde_json::Value::String(value.to_string()));
        Arg::Variable(name)
    }

    fn build(self, root: Field) -> QueryDocument {
        let mut query = format!("query {}", self.name);
        if !self.definitions.is_empty() {
            let definitions: Vec<String> = self.definitions.iter().map(|(name, ty)| format!("${name}: {ty}")).collect();
            query.push_str(&format!("({})", definitions.join(", ")));
        }
        query.push_str(" {\n");
        root.render(1, &mut query);
        query.push_str("}\n");

        let variables = match self.variables.is_empty() {
            true => None,
            false => Some(serde_json::Value::Object(self.variables)),
        };
        QueryDocument { query, variables }
    }
}

fn require(name: &'static str, value: &str) -> Result<(), BuildError> {
    match value.trim().is_empty() {
        true => Err(BuildError::MissingField(name)),
        false => Ok(()),
    }
}

fn require_fights(fight_ids: &[i64]) -> Result<(), BuildError> {
    match fight_ids.is_empty() {
        true => Err(BuildError::MissingField("fightIDs")),
        false => Ok(()),
    }
}

/// `reportData { report(code: $code) { ... } }`, with the code bound as a variable.
fn report_root(op: &mut Operation, code: &str, selection: Vec<Field>) -> Result<Field, BuildError> {
    require("code", code)?;
    let code = op.string("code", code);
    Ok(Field::new("reportData").select([Field::new("report").arg("code", code).select(selection)]))
}

fn server_selection() -> Field {
    Field::new("server").select([
        Field::new("name"),
        Field::new("region").select(leaves(&["slug"])),
    ])
}

fn fight_summary(fights: Field) -> Field {
    fights.select(leaves(&["id", "name", "startTime", "endTime", "difficulty", "kill", "bossPercentage"]))
}

/// One page of the events of a single fight.
fn events_page(data_type: &'static str, fight_id: i64, filters: &[(&'static str, Option<i64>)], paged: bool) -> Field {
    let mut events = Field::new("events")
        .arg("fightIDs", Arg::IntList(vec![fight_id]))
        .arg("dataType", Arg::Enum(data_type));
    for &(name, value) in filters {
        if let Some(value) = value {
            events = events.arg(name, Arg::Int(value));
        }
    }
    match paged {
        true => events.select(leaves(&["data", "nextPageTimestamp"])),
        false => events.select(leaves(&["data"])),
    }
}

/// Send arbitrary query text and variables, untouched.
pub fn custom(query: impl Into<String>, variables: Option<serde_json::Value>) -> Result<QueryDocument, BuildError> {
    let query = query.into();
    require("query", &query)?;
    Ok(QueryDocument { query, variables })
}

/// Report metadata, owner guild, fight summaries and player roster.
pub fn report(request: &ReportRequest) -> Result<QueryDocument, BuildError> {
    let mut op = Operation::new("Report");

    let fights = match request.fight_filter() {
        Some(FightFilter::Window { start_time, end_time }) => Field::new("fights")
            .arg("startTime", Arg::Int(start_time))
            .arg("endTime", Arg::Int(end_time)),
        Some(FightFilter::Fights(ids)) => Field::new("fights").arg("fightIDs", Arg::IntList(ids)),
        None => Field::new("fights"),
    };

    let mut selection = leaves(&["code", "title", "startTime", "endTime"]);
    selection.push(Field::new("owner").select(leaves(&["name"])));
    selection.push(Field::new("guild").select([Field::new("name"), server_selection()]));
    selection.push(fight_summary(fights));
    selection.push(Field::new("masterData").select([
        Field::new("actors")
            .arg("type", Arg::Literal("Player"))
            .select(leaves(&["id", "name", "type", "subType", "server"])),
    ]));

    let root = report_root(&mut op, &request.code, selection)?;
    Ok(op.build(root))
}

/// Fight summaries, player details and the damage done table of some fights.
pub fn fight_details(code: &str, fight_ids: &[i64]) -> Result<QueryDocument, BuildError> {
    require_fights(fight_ids)?;
    let mut op = Operation::new("FightDetails");

    let selection = vec![
        Field::new("code"),
        Field::new("title"),
        fight_summary(Field::new("fights").arg("fightIDs", Arg::IntList(fight_ids.to_vec()))),
        Field::new("playerDetails").arg("fightIDs", Arg::IntList(fight_ids.to_vec())),
        Field::new("table")
            .arg("fightIDs", Arg::IntList(fight_ids.to_vec()))
            .arg("dataType", Arg::Enum(DataType::DamageDone.as_str())),
    ];

    let root = report_root(&mut op, code, selection)?;
    Ok(op.build(root))
}

fn server_entity_args(op: &mut Operation, field: Field, entity: &ServerEntity) -> Result<Field, BuildError> {
    require("name", &entity.name)?;
    require("serverSlug", &entity.server_slug)?;
    require("serverRegion", &entity.server_region)?;
    Ok(field
        .arg("name", op.string("name", &entity.name))
        .arg("serverSlug", op.string("serverSlug", &entity.server_slug))
        .arg("serverRegion", op.string("serverRegion", &entity.server_region)))
}

/// Identity, class and encounter rankings of a character.
pub fn character(entity: &ServerEntity) -> Result<QueryDocument, BuildError> {
    let mut op = Operation::new("Character");
    let character = server_entity_args(&mut op, Field::new("character"), entity)?.select([
        Field::new("name"),
        server_selection(),
        Field::new("classID"),
        Field::new("encounterRankings"),
    ]);
    Ok(op.build(Field::new("characterData").select([character])))
}

/// Identity, attendance and member roster of a guild.
pub fn guild(entity: &ServerEntity) -> Result<QueryDocument, BuildError> {
    let mut op = Operation::new("Guild");
    let guild = server_entity_args(&mut op, Field::new("guild"), entity)?.select([
        Field::new("name"),
        server_selection(),
        Field::new("attendance").arg("zoneID", Arg::Int(0)),
        Field::new("members").select(leaves(&["name", "classID"])),
    ]);
    Ok(op.build(Field::new("guildData").select([guild])))
}

/// One page of damage done events in a fight, optionally from a single source actor.
pub fn damage_events(code: &str, fight_id: i64, source_id: Option<i64>) -> Result<QueryDocument, BuildError> {
    let mut op = Operation::new("DamageEvents");
    let events = events_page("DamageDone", fight_id, &[("sourceID", source_id)], true);
    let root = report_root(&mut op, code, vec![events])?;
    Ok(op.build(root))
}

/// One page of healing events in a fight, optionally from a single source actor.
pub fn healing_events(code: &str, fight_id: i64, source_id: Option<i64>) -> Result<QueryDocument, BuildError> {
    let mut op = Operation::new("HealingEvents");
    let events = events_page("Healing", fight_id, &[("sourceID", source_id)], true);
    let root = report_root(&mut op, code, vec![events])?;
    Ok(op.build(root))
}

/// The death events of a fight.
pub fn deaths(code: &str, fight_id: i64) -> Result<QueryDocument, BuildError> {
    let mut op = Operation::new("Deaths");
    let events = events_page("Deaths", fight_id, &[], false);
    let root = report_root(&mut op, code, vec![events])?;
    Ok(op.build(root))
}

/// A pre-aggregated table of some fights.
pub fn table(code: &str, fight_ids: &[i64], data_type: DataType) -> Result<QueryDocument, BuildError> {
    require_fights(fight_ids)?;
    let mut op = Operation::new("TableData");
    let table = Field::new("table")
        .arg("fightIDs", Arg::IntList(fight_ids.to_vec()))
        .arg("dataType", Arg::Enum(data_type.as_str()));
    let root = report_root(&mut op, code, vec![table])?;
    Ok(op.build(root))
}

/// One page of cast events in a fight, optionally narrowed to one source actor and one ability.
pub fn skill_timeline(code: &str, fight_id: i64, ability_id: Option<i64>, source_id: Option<i64>) -> Result<QueryDocument, BuildError> {
    let mut op = Operation::new("SkillTimeline");
    let events = events_page("Casts", fight_id, &[("sourceID", source_id), ("abilityID", ability_id)], true);
    let root = report_root(&mut op, code, vec![events])?;
    Ok(op.build(root))
}
