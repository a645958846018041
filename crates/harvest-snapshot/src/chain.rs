use crate::collect::{Trace, TraceSegment};
use crate::lookup::EntityLookup;

const SEPARATOR: &str = "->";

/// One hop of a raw call chain such as `Component:7|Exit:HTTP|Backend:3`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Hop<'a> {
    Component(i64),
    Exit(&'a str),
    Backend(i64),
    Application(i64),
}

fn parse_hop(token: &str) -> Option<Hop<'_>> {
    let (marker, value) = token.trim().split_once(':')?;
    let id = || value.trim().parse::<i64>().unwrap_or(0);
    match marker.trim() {
        "Component" => Some(Hop::Component(id())),
        "Exit" => Some(Hop::Exit(value.trim())),
        "Backend" => Some(Hop::Backend(id())),
        "Application" => Some(Hop::Application(id())),
        _ => None,
    }
}

fn tier_label(lookup: &EntityLookup, id: i64) -> String {
    lookup.tier_name(id).unwrap_or("(Tier)").to_string()
}

fn render_hop(hop: &Hop<'_>, lookup: &EntityLookup) -> String {
    match hop {
        Hop::Component(id) => tier_label(lookup, *id),
        Hop::Exit(exit_type) => format!("[{exit_type}]"),
        Hop::Backend(id) => lookup.backend_name(*id).unwrap_or("(Backend)").to_string(),
        Hop::Application(id) => lookup
            .application_name(*id)
            .unwrap_or("(Application)")
            .to_string(),
    }
}

/// Render a pipe-delimited raw chain with names substituted for ids.
pub fn render_chain(raw: &str, lookup: &EntityLookup) -> String {
    raw.split('|')
        .filter_map(parse_hop)
        .map(|hop| render_hop(&hop, lookup))
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

fn destination_label(lookup: &EntityLookup, entity_type: &str, id: i64) -> String {
    match lookup.destination_name(entity_type, id) {
        Some(name) => name.to_string(),
        None => match entity_type {
            "APPLICATION_COMPONENT" => "(Tier)".to_string(),
            "APPLICATION" => "(Application)".to_string(),
            _ => "(Backend)".to_string(),
        },
    }
}

/// Chain for a single exit call: `Web->[HTTP]->Orders`.
pub fn render_exit(
    from_tier: &str,
    exit_type: &str,
    to_entity_type: &str,
    to_entity_id: i64,
    lookup: &EntityLookup,
) -> String {
    [
        from_tier.to_string(),
        format!("[{exit_type}]"),
        destination_label(lookup, to_entity_type, to_entity_id),
    ]
    .join(SEPARATOR)
}

fn segment_chain(seg: &TraceSegment, lookup: &EntityLookup) -> String {
    let own_tier = tier_label(lookup, seg.row.application_component_id);
    if seg.detail.exit_calls.is_empty() {
        return own_tier;
    }
    let rendered = render_chain(&seg.row.call_chain, lookup);
    if !rendered.is_empty() {
        return rendered;
    }
    // No topology string: derive one from the segment's own exit calls.
    let mut hops = vec![own_tier];
    for call in &seg.detail.exit_calls {
        hops.push(format!("[{}]", call.exit_point_name));
        hops.push(destination_label(lookup, &call.to_entity_type, call.to_entity_id));
    }
    hops.join(SEPARATOR)
}

pub fn build_call_chains(trace: &mut Trace, lookup: &EntityLookup) {
    for seg in &mut trace.segments {
        seg.call_chain = segment_chain(seg, lookup);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::raw::{RawExitCall, RawSegmentDetail, RawSegmentRow};

    fn lookup() -> EntityLookup {
        let mut l = EntityLookup::default();
        l.tiers.insert(7, "Web".into());
        l.tiers.insert(9, "Orders".into());
        l.backends.insert(3, "ORCL".into());
        l
    }

    #[test]
    fn substitutes_names_and_marks_unknowns() {
        let l = lookup();
        assert_eq!(
            render_chain("Component:7|Exit:HTTP|Component:9|Exit:JDBC|Backend:3", &l),
            "Web->[HTTP]->Orders->[JDBC]->ORCL"
        );
        assert_eq!(
            render_chain("Component:7|Exit:WEB_SERVICE|Application:55|Exit:JMS|Backend:4|Component:1", &l),
            "Web->[WEB_SERVICE]->(Application)->[JMS]->(Backend)->(Tier)"
        );
    }

    #[test]
    fn leaf_segment_renders_own_tier() {
        let mut trace = Trace {
            request_id: "r".into(),
            segments: vec![TraceSegment {
                row: RawSegmentRow {
                    application_component_id: 9,
                    call_chain: "Component:7|Exit:HTTP|Component:9".into(),
                    ..RawSegmentRow::default()
                },
                ..TraceSegment::default()
            }],
        };
        build_call_chains(&mut trace, &lookup());
        assert_eq!(trace.segments[0].call_chain, "Orders");
    }

    #[test]
    fn missing_topology_is_derived_from_exit_calls() {
        let mut trace = Trace {
            request_id: "r".into(),
            segments: vec![TraceSegment {
                row: RawSegmentRow {
                    application_component_id: 7,
                    ..RawSegmentRow::default()
                },
                detail: RawSegmentDetail {
                    exit_calls: vec![RawExitCall {
                        exit_point_name: "JDBC".into(),
                        to_entity_type: "BACKEND".into(),
                        to_entity_id: 3,
                        ..RawExitCall::default()
                    }],
                    ..RawSegmentDetail::default()
                },
                ..TraceSegment::default()
            }],
        };
        build_call_chains(&mut trace, &lookup());
        assert_eq!(trace.segments[0].call_chain, "Web->[JDBC]->ORCL");
    }

    #[test]
    fn exit_chain_marks_unknown_destination() {
        assert_eq!(
            render_exit("Web", "HTTP", "APPLICATION_COMPONENT", 99, &lookup()),
            "Web->[HTTP]->(Tier)"
        );
    }
}
