pub mod tests {
    use crate::{Build, BuildId, BuildResult, Commit, NewBuild, VersionId};

    pub const TEST_PROJECT: &str = "app";
    pub const TEST_VERSION: &str = "1.0";
    pub const TEST_BUILD: &str = "abc";

    pub fn mock_commit() -> Commit {
        Commit {
            author: "Jane Doe".to_string(),
            email: "jane@example.com".to_string(),
            description: "fix the build".to_string(),
            hash: "0f2c0b8a54c1e1e7d3a2b1f4a6c9d8e7f6a5b4c3".to_string(),
            timestamp: 999,
        }
    }

    pub fn mock_new_build(project: &str, version: &str, build: &str) -> NewBuild {
        NewBuild {
            project: project.to_string(),
            version: version.to_string(),
            build: build.to_string(),
            result: BuildResult::Success,
            timestamp: 1000,
            duration: 5,
            file_extension: "zip".to_string(),
            commits: vec![mock_commit()],
            flags: vec!["nightly".to_string()],
        }
    }

    pub fn mock_pending_build(id: BuildId, version_id: VersionId, label: &str) -> Build {
        let new_build = mock_new_build(TEST_PROJECT, TEST_VERSION, label);
        new_build.into_build(id, version_id).unwrap()
    }
}
