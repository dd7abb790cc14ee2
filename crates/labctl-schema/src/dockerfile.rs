use std::collections::BTreeMap;

/// One `FROM` instruction of a multi-stage Dockerfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    /// Stage name (`AS <name>`), or the image reference for unnamed stages.
    pub name: String,
    /// Stages this one builds on, via `FROM <stage>` or `COPY --from=<stage>`.
    pub depends_on: Vec<String>,
}

/// Parse the stages of a Dockerfile in declaration order.
///
/// Only `FROM` and `COPY --from=` are inspected. A `FROM` whose image is an
/// earlier stage records that stage as a dependency; `--platform` style flags
/// before the image are skipped.
pub fn parse_stages(content: &str) -> Vec<Stage> {
    let mut stages: Vec<Stage> = Vec::new();

    for line in content.lines() {
        let mut tokens = line.split_whitespace();
        let Some(instruction) = tokens.next() else {
            continue;
        };

        if instruction.eq_ignore_ascii_case("FROM") {
            let rest: Vec<&str> = tokens.filter(|t| !t.starts_with("--")).collect();
            let Some(image) = rest.first() else {
                continue;
            };
            let name = match rest.get(1) {
                Some(kw) if kw.eq_ignore_ascii_case("AS") => {
                    rest.get(2).map_or(*image, |n| *n)
                }
                _ => *image,
            };
            let mut depends_on = Vec::new();
            if stages.iter().any(|s| s.name == *image) {
                depends_on.push((*image).to_owned());
            }
            stages.push(Stage {
                name: name.to_owned(),
                depends_on,
            });
        } else if instruction.eq_ignore_ascii_case("COPY") {
            let from = tokens.find_map(|t| t.strip_prefix("--from="));
            if let (Some(from), Some(current)) = (from, stages.last_mut()) {
                current.depends_on.push(from.to_owned());
            }
        }
    }

    stages
}

/// For every stage, its dependency chain ordered oldest first and ending with
/// the stage itself.
pub fn stage_chains(stages: &[Stage]) -> BTreeMap<String, Vec<String>> {
    let deps: BTreeMap<&str, &[String]> = stages
        .iter()
        .map(|s| (s.name.as_str(), s.depends_on.as_slice()))
        .collect();

    let mut chains = BTreeMap::new();
    for stage in stages {
        let mut chain: Vec<String> = Vec::new();
        let mut to_visit: Vec<String> = vec![stage.name.clone()];
        while !to_visit.is_empty() {
            let current = to_visit.remove(0);
            if chain.contains(&current) {
                continue;
            }
            let mut next: Vec<String> = deps
                .get(current.as_str())
                .map(|d| d.to_vec())
                .unwrap_or_default();
            chain.push(current);
            next.append(&mut to_visit);
            to_visit = next;
        }
        chain.reverse();
        chains.insert(stage.name.clone(), chain);
    }
    chains
}
