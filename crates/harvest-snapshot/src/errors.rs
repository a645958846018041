//! Pairing of catalogued error ids with free-text error details.
//!
//! The two lists share no key. Matching runs ordered passes over whatever is
//! still unmatched; the first pass that pairs a detail wins. Ambiguous input
//! (two errors of the same type in one segment) can pair the wrong way round
//! and that tie-break order is kept stable.

use harvest_core::entity::classify_error_name;
use harvest_core::raw::RawErrorDetail;

use crate::collect::Trace;
use crate::lookup::EntityLookup;

/// Placeholder message for an error id no detail could be paired with.
pub const UNMATCHED_MESSAGE: &str = "(no error detail captured)";

/// How a pairing was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPass {
    Exact,
    Prefix,
    Substring,
    Token,
    SingleRemainder,
    /// Error id with no detail.
    UnmatchedIdentity,
    /// Detail with no catalogued id.
    UnmatchedDetail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedError {
    /// 0 for a detail no id could be paired with.
    pub error_id: i64,
    pub error_name: String,
    pub error_type: String,
    pub message: String,
    pub detail: String,
    pub pass: MatchPass,
}

fn exact(catalogued: &str, detail: &str) -> bool {
    catalogued == detail
}

fn prefix(catalogued: &str, detail: &str) -> bool {
    detail.starts_with(catalogued)
}

fn substring(catalogued: &str, detail: &str) -> bool {
    detail.contains(catalogued)
}

/// Tokens of the detail name, scanned last to first, matched as substrings
/// of the catalogued name.
fn token(catalogued: &str, detail: &str) -> bool {
    detail
        .split(['.', ':'])
        .rev()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .any(|t| catalogued.contains(t))
}

const TEXT_PASSES: [(MatchPass, fn(&str, &str) -> bool); 4] = [
    (MatchPass::Exact, exact),
    (MatchPass::Prefix, prefix),
    (MatchPass::Substring, substring),
    (MatchPass::Token, token),
];

fn first_line(value: &str) -> String {
    value.lines().next().unwrap_or("").trim().to_string()
}

/// Reconcile one segment's error ids against its error details.
///
/// Output follows the id list order; details left over after every pass
/// follow with `error_id` 0.
pub fn match_segment_errors(
    error_ids: &[i64],
    details: &[RawErrorDetail],
    lookup: &EntityLookup,
) -> Vec<MatchedError> {
    // pairing[i] = (detail index, pass) for error_ids[i]
    let mut pairing: Vec<Option<(usize, MatchPass)>> = vec![None; error_ids.len()];
    let mut detail_used = vec![false; details.len()];

    for (pass, matches) in TEXT_PASSES {
        for (d, detail) in details.iter().enumerate() {
            if detail_used[d] {
                continue;
            }
            let found = error_ids.iter().enumerate().position(|(i, id)| {
                let name = lookup.error_name(*id);
                pairing[i].is_none() && !name.is_empty() && matches(name, &detail.name)
            });
            if let Some(i) = found {
                pairing[i] = Some((d, pass));
                detail_used[d] = true;
            }
        }
    }

    let open_ids: Vec<usize> = (0..error_ids.len()).filter(|i| pairing[*i].is_none()).collect();
    let open_details: Vec<usize> = (0..details.len()).filter(|d| !detail_used[*d]).collect();
    if let ([i], [d]) = (open_ids.as_slice(), open_details.as_slice()) {
        pairing[*i] = Some((*d, MatchPass::SingleRemainder));
        detail_used[*d] = true;
    }

    let mut out: Vec<MatchedError> = error_ids
        .iter()
        .zip(&pairing)
        .map(|(id, paired)| {
            let name = lookup.error_name(*id).to_string();
            let error_type = lookup
                .error_type(*id)
                .map(str::to_string)
                .unwrap_or_else(|| classify_error_name(&name).to_string());
            match paired {
                Some((d, pass)) => MatchedError {
                    error_id: *id,
                    error_name: if name.is_empty() {
                        details[*d].name.clone()
                    } else {
                        name
                    },
                    error_type,
                    message: first_line(&details[*d].value),
                    detail: details[*d].value.clone(),
                    pass: *pass,
                },
                None => MatchedError {
                    error_id: *id,
                    error_name: name,
                    error_type,
                    message: UNMATCHED_MESSAGE.to_string(),
                    detail: String::new(),
                    pass: MatchPass::UnmatchedIdentity,
                },
            }
        })
        .collect();

    out.extend(
        details
            .iter()
            .zip(&detail_used)
            .filter(|(_, used)| !**used)
            .map(|(detail, _)| MatchedError {
                error_id: 0,
                error_name: detail.name.clone(),
                error_type: classify_error_name(&detail.name).to_string(),
                message: first_line(&detail.value),
                detail: detail.value.clone(),
                pass: MatchPass::UnmatchedDetail,
            }),
    );
    out
}

pub fn match_errors(trace: &mut Trace, lookup: &EntityLookup) {
    for seg in &mut trace.segments {
        seg.errors = match_segment_errors(&seg.row.error_ids, &seg.detail.error_details, lookup);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(errors: &[(i64, &str)]) -> EntityLookup {
        let mut l = EntityLookup::default();
        for (id, name) in errors {
            l.errors
                .insert(*id, ((*name).to_string(), classify_error_name(name).to_string()));
        }
        l
    }

    fn detail(name: &str, value: &str) -> RawErrorDetail {
        RawErrorDetail {
            name: name.into(),
            value: value.into(),
        }
    }

    fn pairs(out: &[MatchedError]) -> Vec<(i64, String, MatchPass)> {
        out.iter()
            .map(|e| (e.error_id, e.detail.clone(), e.pass))
            .collect()
    }

    #[test]
    fn npe_matches_by_substring() {
        let l = lookup(&[(100, "NullPointerException")]);
        let out = match_segment_errors(
            &[100],
            &[detail("java.lang.NullPointerException", "NPE at Foo.bar\n\tat Foo.main")],
            &l,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].error_id, 100);
        assert_eq!(out[0].pass, MatchPass::Substring);
        assert_eq!(out[0].message, "NPE at Foo.bar");
        assert_eq!(out[0].error_type, "Exception");
    }

    #[test]
    fn earlier_pass_wins_over_later_candidate() {
        let l = lookup(&[(1, "Timeout"), (2, "TimeoutException")]);
        let out = match_segment_errors(&[1, 2], &[detail("TimeoutException", "t")], &l);
        // Exact on id 2 beats prefix on id 1.
        assert_eq!(out[1].error_id, 2);
        assert_eq!(out[1].pass, MatchPass::Exact);
        assert_eq!(out[0].pass, MatchPass::UnmatchedIdentity);
    }

    #[test]
    fn prefix_and_token_passes() {
        let l = lookup(&[(5, "HTTP Error Code"), (6, "SQLException in OrderDao")]);
        let out = match_segment_errors(
            &[5, 6],
            &[
                detail("HTTP Error Code : 500", "Internal"),
                detail("com.acme.db:SQLException", "ORA-00942"),
            ],
            &l,
        );
        assert_eq!(out[0].pass, MatchPass::Prefix);
        assert_eq!(out[0].message, "Internal");
        assert_eq!(out[1].pass, MatchPass::Token);
        assert_eq!(out[1].message, "ORA-00942");
    }

    #[test]
    fn single_remainder_is_paired() {
        let l = lookup(&[(7, "Custom Business Error")]);
        let out = match_segment_errors(&[7], &[detail("Unrelated", "boom")], &l);
        assert_eq!(pairs(&out), vec![(7, "boom".to_string(), MatchPass::SingleRemainder)]);
    }

    #[test]
    fn leftover_ids_get_placeholders_and_leftover_details_keep_zero_id() {
        let l = lookup(&[(1, "Alpha"), (2, "Beta")]);
        let out = match_segment_errors(&[1, 2], &[detail("Gamma", "g")], &l);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].message, UNMATCHED_MESSAGE);
        assert_eq!(out[1].message, UNMATCHED_MESSAGE);
        assert_eq!(out[2].error_id, 0);
        assert_eq!(out[2].pass, MatchPass::UnmatchedDetail);
    }

    #[test]
    fn same_type_errors_pair_in_listing_order() {
        let l = lookup(&[(1, "NullPointerException"), (2, "NullPointerException")]);
        let details = [
            detail("java.lang.NullPointerException", "first"),
            detail("java.lang.NullPointerException", "second"),
        ];
        let a = match_segment_errors(&[1, 2], &details, &l);
        let b = match_segment_errors(&[1, 2], &details, &l);
        assert_eq!(a, b);
        assert_eq!(pairs(&a)[0], (1, "first".to_string(), MatchPass::Substring));
        assert_eq!(pairs(&a)[1], (2, "second".to_string(), MatchPass::Substring));
    }

    #[test]
    fn unknown_id_never_text_matches() {
        let l = lookup(&[]);
        let out = match_segment_errors(&[42, 43], &[detail("Anything", "a")], &l);
        assert!(out[..2].iter().all(|e| e.pass == MatchPass::UnmatchedIdentity));
        assert_eq!(out[2].pass, MatchPass::UnmatchedDetail);
    }
}
