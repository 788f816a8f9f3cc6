//! Terminal rendering.

use colored::{ColoredString, Colorize};
use owlmap_engine::{
    DetailState, Entity, EntityId, GeoId, LinkStatus, LinkSummary, LoadReport, MapSession,
    SearchHit, TypeFacet, TypeId,
};
use serde::Serialize;

#[derive(Serialize)]
pub struct ItemRow {
    pub id: EntityId,
    pub label: String,
    pub status: LinkStatus,
    pub types: Vec<TypeId>,
    pub osm: Vec<GeoId>,
}

impl ItemRow {
    fn from_entity(entity: &Entity) -> Self {
        Self {
            id: entity.id().clone(),
            label: entity
                .knowledge()
                .map(|k| k.label.clone())
                .or_else(|| entity.geo_records().iter().find_map(|g| g.name.clone()))
                .unwrap_or_default(),
            status: entity.link_status(),
            types: entity.type_list().map(<[TypeId]>::to_vec).unwrap_or_default(),
            osm: entity
                .geo_records()
                .iter()
                .map(|g| g.identifier.clone())
                .collect(),
        }
    }
}

/// Everything the `load` command prints.
#[derive(Serialize)]
pub struct LoadView {
    pub load: LoadReport,
    pub failures: Vec<String>,
    pub summary: LinkSummary,
    pub facets: Vec<TypeFacet>,
    pub visible: Vec<ItemRow>,
    /// Referenced from OSM but the item could not be loaded.
    pub orphaned: Vec<ItemRow>,
}

impl LoadView {
    pub fn capture(session: &MapSession, load: LoadReport) -> Self {
        session.read(|engine| {
            let visible = engine
                .visible_ids()
                .iter()
                .filter_map(|id| engine.entity(id))
                .map(ItemRow::from_entity)
                .collect();
            let orphaned = engine
                .index()
                .orphaned_ids()
                .iter()
                .filter_map(|id| engine.entity(id))
                .map(ItemRow::from_entity)
                .collect();

            Self {
                failures: load.failures.iter().map(ToString::to_string).collect(),
                load,
                summary: engine.summary(),
                facets: engine.facet_snapshot(),
                visible,
                orphaned,
            }
        })
    }
}

fn status_tag(status: LinkStatus) -> ColoredString {
    let text = format!("{:<10}", status.as_str());
    match status {
        LinkStatus::Linked => text.green(),
        LinkStatus::Unlinked => text.red(),
        LinkStatus::Orphaned => text.yellow(),
        LinkStatus::GeoOnlyUnresolved => text.dimmed(),
    }
}

pub fn print_load(view: &LoadView) {
    println!(
        "{} cycle {} · {} items · {} OSM objects",
        "Loaded".green().bold(),
        view.load.cycle,
        view.load.knowledge_items,
        view.load.geo_objects
    );
    if !view.load.resolved.is_empty() {
        println!(
            "  {} {} items found by id",
            "→".yellow(),
            view.load.resolved.len()
        );
    }
    for failure in &view.failures {
        println!("  {} {failure}", "warning:".yellow().bold());
    }
    if !view.load.both_loaded {
        println!("  {} load incomplete", "warning:".yellow().bold());
    }

    let s = &view.summary;
    println!(
        "\n{} {} linked, {} unlinked, {} orphaned",
        "Summary:".bold(),
        s.linked.to_string().green(),
        s.unlinked.to_string().red(),
        s.orphaned.to_string().yellow()
    );

    if !view.facets.is_empty() {
        println!("\n{}", "Types:".bold());
        for facet in &view.facets {
            println!("  {:>5}  {} ({})", facet.count, facet.label, facet.type_id);
        }
    }

    println!("\n{} {}", "Items:".bold(), view.visible.len());
    for row in &view.visible {
        print_row(row);
    }

    if !view.orphaned.is_empty() {
        println!("\n{} {}", "OSM only:".bold(), view.orphaned.len());
        for row in &view.orphaned {
            print_row(row);
        }
    }
}

fn print_row(row: &ItemRow) {
    let osm = row
        .osm
        .iter()
        .map(GeoId::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    println!(
        "  {} {:<10} {} {}",
        status_tag(row.status),
        row.id.as_str(),
        row.label,
        osm.dimmed()
    );
}

pub fn print_detail(state: &DetailState, entity: Option<&Entity>) {
    let Some(id) = state.focused() else {
        println!("{}", "No item open".dimmed());
        return;
    };

    let label = entity
        .and_then(Entity::knowledge)
        .map(|k| k.label.as_str())
        .unwrap_or_default();
    println!("{} {} {}", "Item".green().bold(), id, label.bold());
    if let Some(entity) = entity {
        println!("  status: {}", status_tag(entity.link_status()));
        for geo in entity.geo_records() {
            println!("  linked: {}", geo.identifier);
        }
    }

    match state.tags() {
        Some(tags) if !tags.is_empty() => {
            println!("\n{}", "Tags:".bold());
            for tag in tags {
                println!("  {tag}");
            }
        }
        Some(_) => println!("\n{}", "No tags for this item's types".dimmed()),
        None => println!("\n{}", "Tags not loaded".yellow()),
    }

    let candidates = state.candidates();
    println!("\n{} {}", "Candidates:".bold(), candidates.len());
    for candidate in candidates {
        let name = candidate.name.as_deref().unwrap_or("(no name)");
        let matched = candidate
            .matched_presets
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "  {:>8.1} m  {:<16} {} {}",
            candidate.distance_meters,
            candidate.identifier.as_str(),
            name,
            matched.green()
        );
    }
}

/// Each hit with the `zoom/lat/lon` map position it opens at.
pub fn print_hits(query: &str, hits: &[SearchHit], zoom: u8) {
    if hits.is_empty() {
        println!("{} `{query}`", "No results for".yellow());
        return;
    }
    for hit in hits {
        println!(
            "  {:<40} {:<20} {}/{:.5}/{:.5}",
            hit.name,
            hit.category.dimmed(),
            zoom,
            hit.lat,
            hit.lon
        );
    }
}
