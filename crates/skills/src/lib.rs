//! Skill discovery — markdown files with YAML front-matter.
//!
//! A skill is a markdown document whose front-matter declares `name` and
//! `description`; the body is injected into the model prompt when the skill
//! is selected. Skills are discovered at startup from three directories of
//! increasing precedence:
//!
//! 1. built-in (shipped under the storage root)
//! 2. user-global (`~/.miniagent/skills`)
//! 3. project-local (`./skills`)
//!
//! Later sources replace earlier entries with the same name. Files missing
//! the required fields are skipped with a warning.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where a skill was discovered. Ordering is precedence: later wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SkillSource {
    BuiltIn,
    User,
    Project,
}

impl SkillSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillSource::BuiltIn => "builtin",
            SkillSource::User => "user",
            SkillSource::Project => "project",
        }
    }
}

/// A discovered skill.
#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub body: String,
    pub source: SkillSource,
    pub path: PathBuf,
}

/// Required front-matter fields.
#[derive(Debug, Deserialize)]
struct FrontMatter {
    name: String,
    description: String,
}

/// The immutable set of skills available to one process.
#[derive(Debug, Default)]
pub struct SkillSet {
    skills: HashMap<String, Skill>,
}

impl SkillSet {
    /// Discover skills from the three standard directories. Missing
    /// directories are silently skipped.
    pub fn discover(builtin: &Path, user: &Path, project: &Path) -> Self {
        let mut set = SkillSet::default();
        for (source, dir) in [
            (SkillSource::BuiltIn, builtin),
            (SkillSource::User, user),
            (SkillSource::Project, project),
        ] {
            set.load_dir(source, dir);
        }
        debug!(count = set.skills.len(), "Skill discovery complete");
        set
    }

    fn load_dir(&mut self, source: SkillSource, dir: &Path) {
        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let content = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable skill file");
                    continue;
                }
            };
            match parse_skill(&content, source, &path) {
                Ok(skill) => {
                    // Later sources override earlier entries with the same name.
                    self.skills.insert(skill.name.clone(), skill);
                }
                Err(reason) => {
                    warn!(path = %path.display(), reason = %reason, "Skipping skill file");
                }
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.skills.get(name)
    }

    /// All skills sorted by name.
    pub fn list(&self) -> Vec<&Skill> {
        let mut skills: Vec<&Skill> = self.skills.values().collect();
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        skills
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    /// Markdown section listing skill names and descriptions, for the
    /// system prompt and the `skill` tool description.
    pub fn prompt_section(&self) -> String {
        if self.skills.is_empty() {
            return String::new();
        }
        let mut out = String::from("## Available skills\n");
        for skill in self.list() {
            out.push_str(&format!("- {}: {}\n", skill.name, skill.description));
        }
        out
    }
}

/// Parse one skill file: YAML front-matter between `---` fences, body after.
fn parse_skill(content: &str, source: SkillSource, path: &Path) -> Result<Skill, String> {
    let (front, body) = split_front_matter(content)
        .ok_or_else(|| "missing front-matter fences".to_string())?;

    let meta: FrontMatter =
        serde_yaml::from_str(front).map_err(|e| format!("invalid front-matter: {e}"))?;

    if meta.name.trim().is_empty() {
        return Err("empty 'name' field".into());
    }
    if meta.description.trim().is_empty() {
        return Err("empty 'description' field".into());
    }

    Ok(Skill {
        name: meta.name.trim().to_string(),
        description: meta.description.trim().to_string(),
        body: body.trim().to_string(),
        source,
        path: path.to_path_buf(),
    })
}

/// Split `---\n<yaml>\n---\n<body>` into front-matter and body.
fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let trimmed = content.trim_start();
    let rest = trimmed.strip_prefix("---")?;
    let rest = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n"))?;
    let end = rest.find("\n---")?;
    let front = &rest[..end];
    let body = rest[end + 4..].trim_start_matches(['-', '\r']).trim_start_matches('\n');
    Some((front, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_skill(dir: &Path, file: &str, content: &str) {
        let mut f = std::fs::File::create(dir.join(file)).unwrap();
        write!(f, "{content}").unwrap();
    }

    const HELLO: &str = "---\nname: hello\ndescription: Greets the user warmly\n---\nWhen asked to greet, respond with enthusiasm.\n";

    #[test]
    fn parse_valid_skill() {
        let skill = parse_skill(HELLO, SkillSource::BuiltIn, Path::new("hello.md")).unwrap();
        assert_eq!(skill.name, "hello");
        assert_eq!(skill.description, "Greets the user warmly");
        assert!(skill.body.contains("enthusiasm"));
    }

    #[test]
    fn parse_rejects_missing_fences() {
        let err = parse_skill("just markdown", SkillSource::BuiltIn, Path::new("x.md"));
        assert!(err.is_err());
    }

    #[test]
    fn parse_rejects_missing_description() {
        let content = "---\nname: lonely\n---\nbody\n";
        let err = parse_skill(content, SkillSource::BuiltIn, Path::new("x.md"));
        assert!(err.is_err());
    }

    #[test]
    fn discover_from_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let builtin = tmp.path().join("builtin");
        std::fs::create_dir_all(&builtin).unwrap();
        write_skill(&builtin, "hello.md", HELLO);
        write_skill(&builtin, "notes.txt", "not a skill");

        let set = SkillSet::discover(
            &builtin,
            &tmp.path().join("missing-user"),
            &tmp.path().join("missing-project"),
        );
        assert_eq!(set.len(), 1);
        assert!(set.get("hello").is_some());
    }

    #[test]
    fn later_sources_override_earlier() {
        let tmp = tempfile::tempdir().unwrap();
        let builtin = tmp.path().join("builtin");
        let project = tmp.path().join("project");
        std::fs::create_dir_all(&builtin).unwrap();
        std::fs::create_dir_all(&project).unwrap();

        write_skill(&builtin, "hello.md", HELLO);
        write_skill(
            &project,
            "hello.md",
            "---\nname: hello\ndescription: Project-local greeting\n---\nProject body.\n",
        );

        let set = SkillSet::discover(&builtin, &tmp.path().join("none"), &project);
        let skill = set.get("hello").unwrap();
        assert_eq!(skill.source, SkillSource::Project);
        assert_eq!(skill.description, "Project-local greeting");
    }

    #[test]
    fn malformed_files_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let builtin = tmp.path().join("builtin");
        std::fs::create_dir_all(&builtin).unwrap();
        write_skill(&builtin, "good.md", HELLO);
        write_skill(&builtin, "bad.md", "---\nname: [unclosed\n---\nbody\n");

        let set = SkillSet::discover(
            &builtin,
            &tmp.path().join("none"),
            &tmp.path().join("none2"),
        );
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn prompt_section_lists_skills() {
        let tmp = tempfile::tempdir().unwrap();
        let builtin = tmp.path().join("builtin");
        std::fs::create_dir_all(&builtin).unwrap();
        write_skill(&builtin, "hello.md", HELLO);

        let set = SkillSet::discover(
            &builtin,
            &tmp.path().join("none"),
            &tmp.path().join("none2"),
        );
        let section = set.prompt_section();
        assert!(section.contains("hello: Greets the user warmly"));
    }

    #[test]
    fn empty_set_has_empty_prompt_section() {
        let set = SkillSet::default();
        assert!(set.prompt_section().is_empty());
        assert!(set.is_empty());
    }
}
