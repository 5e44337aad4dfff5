//! Filesystem dumping of failed states (spec.md §1 lists this as an
//! out-of-core, CLI-owned concern). Each [`ct_core::harness::Issue`] is
//! written as one JSON file per issue, named by rule and index, using the
//! same `RegressionEntry` shape `ct-cli regressions` reads back in.

use std::fs;
use std::path::Path;

use ct_core::harness::Issue;

use crate::regressions::RegressionEntry;

pub fn dump_issues(dir: &Path, issues: &[Issue]) -> eyre::Result<()> {
    fs::create_dir_all(dir).map_err(|e| eyre::eyre!("creating dump dir {}: {e}", dir.display()))?;
    for (i, issue) in issues.iter().enumerate() {
        let entry = RegressionEntry {
            rule_name: issue.rule_name.clone(),
            pre: issue.pre_state.clone(),
            post: issue.expected_post.clone(),
        };
        let path = dir.join(format!("{}-{i:04}.json", sanitize(&issue.rule_name)));
        let json = serde_json::to_string_pretty(&entry)
            .map_err(|e| eyre::eyre!("serializing issue for {}: {e}", issue.rule_name))?;
        fs::write(&path, json).map_err(|e| eyre::eyre!("writing {}: {e}", path.display()))?;
    }
    Ok(())
}

fn sanitize(name: &str) -> String {
    name.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect()
}
