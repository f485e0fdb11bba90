// src/exec/script.rs

//! Script normalisation applied before every run.
//!
//! The rewrite is pure and idempotent: feeding its output back in yields the
//! same text.

use std::path::{Path, PathBuf};

use crate::config::ExecutorConfig;

/// Rewrite a script body for execution.
///
/// - lines containing any `discard_directives` substring are dropped;
/// - body lines equal to a setup command are dropped (setup is re-added once
///   at the top);
/// - a postfix block already present at the end is stripped (re-added once);
/// - of all lines containing `activation_directive`, only the first is kept.
///
/// The result always ends with exactly one newline.
pub fn rewrite_script(content: &str, cfg: &ExecutorConfig) -> String {
    let setup: Vec<&str> = cfg
        .setup_commands
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect();
    let postfix: Vec<&str> = cfg
        .postfix_commands
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect();

    let mut body: Vec<&str> = content
        .lines()
        .filter(|line| !is_discarded(line, &cfg.discard_directives))
        .filter(|line| !setup.contains(&line.trim()))
        .collect();

    trim_trailing_blank(&mut body);
    if !postfix.is_empty() && ends_with_block(&body, &postfix) {
        body.truncate(body.len() - postfix.len());
        trim_trailing_blank(&mut body);
    }

    let directive = cfg.activation_directive.trim();
    let mut seen_activation = false;
    let mut out: Vec<&str> = Vec::with_capacity(setup.len() + body.len() + postfix.len());

    for line in setup.iter().copied().chain(body).chain(postfix.iter().copied()) {
        if !directive.is_empty() && line.contains(directive) {
            if seen_activation {
                continue;
            }
            seen_activation = true;
        }
        out.push(line);
    }

    let mut rewritten = out.join("\n");
    rewritten.push('\n');
    rewritten
}

/// Where the rewritten script for `script` is written.
pub fn execute_path(script: &Path) -> PathBuf {
    let mut name = script.as_os_str().to_os_string();
    name.push(".execute.sh");
    PathBuf::from(name)
}

fn is_discarded(line: &str, directives: &[String]) -> bool {
    directives
        .iter()
        .filter(|d| !d.is_empty())
        .any(|d| line.contains(d.as_str()))
}

fn trim_trailing_blank(lines: &mut Vec<&str>) {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
}

fn ends_with_block(lines: &[&str], block: &[&str]) -> bool {
    lines.len() >= block.len()
        && lines[lines.len() - block.len()..]
            .iter()
            .zip(block)
            .all(|(line, expected)| line.trim() == *expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ExecutorConfig {
        ExecutorConfig {
            setup_commands: vec![
                "eval \"$(mamba shell hook --shell bash)\"".to_string(),
                "mamba activate abc_runtime".to_string(),
            ],
            postfix_commands: vec!["echo done".to_string()],
            ..ExecutorConfig::default()
        }
    }

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.lines().filter(|l| l.contains(needle)).count()
    }

    #[test]
    fn repeated_activation_is_kept_once() {
        let script = "mamba activate abc_runtime\n\
                      echo one\n\
                      mamba activate abc_runtime\n\
                      echo two\n\
                      mamba activate abc_runtime\n";

        let out = rewrite_script(script, &cfg());
        assert_eq!(count(&out, "mamba activate abc_runtime"), 1);
        assert_eq!(
            out,
            "eval \"$(mamba shell hook --shell bash)\"\n\
             mamba activate abc_runtime\n\
             echo one\n\
             echo two\n\
             echo done\n"
        );
    }

    #[test]
    fn activation_in_body_survives_when_setup_lacks_it() {
        let config = ExecutorConfig {
            activation_directive: "source env.sh".to_string(),
            ..ExecutorConfig::default()
        };
        let out = rewrite_script("echo a\nsource env.sh\nsource env.sh\necho b", &config);
        assert_eq!(out, "echo a\nsource env.sh\necho b\n");
    }

    #[test]
    fn discarded_hook_lines_are_removed() {
        let out = rewrite_script(
            "eval \"$(conda shell.bash hook)\"\necho hi\n",
            &ExecutorConfig::default(),
        );
        assert_eq!(out, "echo hi\n");
    }

    #[test]
    fn rewrite_is_idempotent() {
        let script = "#!/bin/bash\n\nmamba activate abc_runtime\necho x\n\n\n";
        let once = rewrite_script(script, &cfg());
        let twice = rewrite_script(&once, &cfg());
        assert_eq!(once, twice);
    }

    #[test]
    fn execute_path_appends_suffix() {
        assert_eq!(
            execute_path(Path::new("/tmp/run/step1.sh")),
            PathBuf::from("/tmp/run/step1.sh.execute.sh")
        );
    }
}
