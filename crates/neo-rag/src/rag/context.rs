use crate::types::SearchHit;

const SEPARATOR: &str = "\n\n";

/// Join ranked hits into one context block of at most `max_chars` characters.
///
/// Hits are taken best-first and the first one that no longer fits ends the
/// block, so the lowest-ranked chunks are the ones dropped. A top hit that is
/// alone larger than the budget is cut at a character boundary. Returns the
/// context and the number of hits used.
pub fn build_context(hits: &[SearchHit], max_chars: usize) -> (String, usize) {
    let mut context = String::new();
    let mut used_chars = 0;
    let mut used_hits = 0;

    for hit in hits {
        let content = hit.chunk.content.as_str();
        let chars = content.chars().count();
        let separator = if used_hits == 0 { 0 } else { SEPARATOR.len() };

        if used_chars + separator + chars <= max_chars {
            if used_hits > 0 {
                context.push_str(SEPARATOR);
            }
            context.push_str(content);
            used_chars += separator + chars;
            used_hits += 1;
        } else {
            if used_hits == 0 && max_chars > 0 {
                context.extend(content.chars().take(max_chars));
                used_hits = 1;
            }
            break;
        }
    }

    if used_hits < hits.len() {
        tracing::debug!(
            kept = used_hits,
            dropped = hits.len() - used_hits,
            max_chars,
            "context budget reached"
        );
    }
    (context, used_hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;

    fn hits(texts: &[&str]) -> Vec<SearchHit> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| SearchHit {
                chunk: Chunk::new(*t, "doc.txt", i),
                score: 1.0 - i as f32 * 0.1,
            })
            .collect()
    }

    #[test]
    fn test_all_hits_fit() {
        let (context, used) = build_context(&hits(&["one", "two"]), 100);
        assert_eq!(context, "one\n\ntwo");
        assert_eq!(used, 2);
    }

    #[test]
    fn test_lowest_ranked_dropped_first() {
        let (context, used) = build_context(&hits(&["aaaa", "bbbb", "cccc"]), 11);
        assert_eq!(context, "aaaa\n\nbbbb");
        assert_eq!(used, 2);
    }

    #[test]
    fn test_oversized_top_hit_is_truncated() {
        let (context, used) = build_context(&hits(&["héllo wörld", "x"]), 4);
        assert_eq!(context, "héll");
        assert_eq!(used, 1);
    }

    #[test]
    fn test_zero_budget_gives_empty_context() {
        let (context, used) = build_context(&hits(&["abc"]), 0);
        assert!(context.is_empty());
        assert_eq!(used, 0);
    }
}
