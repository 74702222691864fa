pub mod test_objects;

use std::fmt::{self, Display};

use anyhow::{anyhow, Result};
use derive_builder::Builder;
use md5::Md5;
use registry_utils::get_epoch_time_in_ms;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use strum::AsRefStr;

/// Width of an encoded id. Composite keys are `<id><name>` so the id prefix
/// must be fixed width.
pub const ID_KEY_LEN: usize = 8;

macro_rules! row_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
        )]
        pub struct $name(u64);

        impl $name {
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            pub fn get(&self) -> u64 {
                self.0
            }

            /// Big endian so that byte order in the store is id order.
            pub fn to_key(&self) -> [u8; ID_KEY_LEN] {
                self.0.to_be_bytes()
            }

            pub fn from_key(key: &[u8]) -> Result<Self> {
                let bytes: [u8; ID_KEY_LEN] = key
                    .get(..ID_KEY_LEN)
                    .and_then(|prefix| prefix.try_into().ok())
                    .ok_or(anyhow!(
                        "invalid {} key of length {}",
                        stringify!($name),
                        key.len()
                    ))?;
                Ok(Self(u64::from_be_bytes(bytes)))
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

row_id!(ProjectId);
row_id!(VersionId);
row_id!(BuildId);

fn composite_key(prefix: [u8; ID_KEY_LEN], name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(ID_KEY_LEN + name.len());
    key.extend_from_slice(&prefix);
    key.extend_from_slice(name.as_bytes());
    key
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub created_at: u64,
}

impl Project {
    pub fn new(id: ProjectId, name: String) -> Self {
        Self {
            id,
            name,
            created_at: get_epoch_time_in_ms(),
        }
    }

    pub fn key(&self) -> [u8; ID_KEY_LEN] {
        self.id.to_key()
    }

    pub fn name_key(&self) -> Vec<u8> {
        Project::name_key_from(&self.name)
    }

    pub fn name_key_from(name: &str) -> Vec<u8> {
        name.as_bytes().to_vec()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Version {
    pub id: VersionId,
    pub project_id: ProjectId,
    pub name: String,
    pub created_at: u64,
}

impl Version {
    pub fn new(id: VersionId, project_id: ProjectId, name: String) -> Self {
        Self {
            id,
            project_id,
            name,
            created_at: get_epoch_time_in_ms(),
        }
    }

    pub fn key(&self) -> [u8; ID_KEY_LEN] {
        self.id.to_key()
    }

    pub fn name_key(&self) -> Vec<u8> {
        Version::name_key_from(self.project_id, &self.name)
    }

    /// Versions are unique per project, not globally.
    pub fn name_key_from(project_id: ProjectId, name: &str) -> Vec<u8> {
        composite_key(project_id.to_key(), name)
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, AsRefStr, strum::Display, Hash,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildResult {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Commit {
    pub author: String,
    pub email: String,
    pub description: String,
    pub hash: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, strum::Display)]
pub enum BuildState {
    Pending,
    Ready,
}

/// Lowercase hex digests of one artifact's exact bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ContentDigests {
    pub md5: String,
    pub sha256: String,
    pub sha512: String,
}

impl ContentDigests {
    pub fn compute(data: &[u8]) -> Self {
        Self {
            md5: format!("{:x}", Md5::digest(data)),
            sha256: format!("{:x}", Sha256::digest(data)),
            sha512: format!("{:x}", Sha512::digest(data)),
        }
    }

    /// Blobs are addressed by md5.
    pub fn storage_key(&self) -> &str {
        &self.md5
    }

    pub fn is_empty(&self) -> bool {
        self.md5.is_empty() && self.sha256.is_empty() && self.sha512.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Builder)]
#[builder(build_fn(skip))]
pub struct Build {
    pub id: BuildId,
    pub version_id: VersionId,
    pub ready: bool,
    pub file_extension: String,
    /// Caller supplied label, unique within a version.
    pub label: String,
    pub result: BuildResult,
    pub timestamp: u64,
    pub duration: Option<u64>,
    pub md5: String,
    pub sha256: String,
    pub sha512: String,
    pub commits: Vec<Commit>,
    pub flags: Vec<String>,
    pub size_bytes: Option<u64>,
    pub created_at: u64,
    pub finalized_at: Option<u64>,
}

impl Build {
    pub fn key(&self) -> [u8; ID_KEY_LEN] {
        self.id.to_key()
    }

    pub fn label_key_from(version_id: VersionId, label: &str) -> Vec<u8> {
        composite_key(version_id.to_key(), label)
    }

    pub fn state(&self) -> BuildState {
        if self.ready {
            BuildState::Ready
        } else {
            BuildState::Pending
        }
    }

    pub fn digests(&self) -> ContentDigests {
        ContentDigests {
            md5: self.md5.clone(),
            sha256: self.sha256.clone(),
            sha512: self.sha512.clone(),
        }
    }

    /// Storage key of the artifact; `None` while the build is pending.
    pub fn storage_key(&self) -> Option<&str> {
        match self.state() {
            BuildState::Ready => Some(&self.md5),
            BuildState::Pending => None,
        }
    }

    /// The single Pending -> Ready transition. Digests are fixed afterwards.
    pub fn mark_ready(&mut self, digests: ContentDigests, size_bytes: u64) -> Result<()> {
        if self.ready {
            return Err(anyhow!("build {} is already ready", self.id));
        }
        if digests.is_empty() {
            return Err(anyhow!("build {} cannot be finalized without digests", self.id));
        }
        self.md5 = digests.md5;
        self.sha256 = digests.sha256;
        self.sha512 = digests.sha512;
        self.size_bytes = Some(size_bytes);
        self.finalized_at = Some(get_epoch_time_in_ms());
        self.ready = true;
        Ok(())
    }

    /// `{project}-{version}-{build}.{fileExtension}`
    pub fn suggested_filename(&self, project: &str, version: &str) -> String {
        format!(
            "{}-{}-{}.{}",
            project, version, self.label, self.file_extension
        )
    }
}

impl BuildBuilder {
    /// Builds a pending build: not ready, with empty digests.
    pub fn build(&self) -> Result<Build> {
        let id = self.id.ok_or(anyhow!("build id is required"))?;
        let version_id = self.version_id.ok_or(anyhow!("version id is required"))?;
        let label = self.label.clone().ok_or(anyhow!("build label is required"))?;
        let file_extension = self
            .file_extension
            .clone()
            .ok_or(anyhow!("file extension is required"))?;
        let result = self.result.ok_or(anyhow!("build result is required"))?;
        let timestamp = self.timestamp.ok_or(anyhow!("timestamp is required"))?;
        Ok(Build {
            id,
            version_id,
            ready: false,
            file_extension,
            label,
            result,
            timestamp,
            duration: self.duration.flatten(),
            md5: String::new(),
            sha256: String::new(),
            sha512: String::new(),
            commits: self.commits.clone().unwrap_or_default(),
            flags: self.flags.clone().unwrap_or_default(),
            size_bytes: None,
            created_at: get_epoch_time_in_ms(),
            finalized_at: None,
        })
    }
}

/// Everything a caller supplies when registering a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBuild {
    pub project: String,
    pub version: String,
    pub build: String,
    pub result: BuildResult,
    pub timestamp: u64,
    pub duration: u64,
    pub file_extension: String,
    pub commits: Vec<Commit>,
    pub flags: Vec<String>,
}

impl NewBuild {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("project", &self.project),
            ("version", &self.version),
            ("build", &self.build),
            ("fileExtension", &self.file_extension),
        ] {
            if value.is_empty() {
                return Err(anyhow!("{} must not be empty", field));
            }
        }
        if self.timestamp == 0 {
            return Err(anyhow!("timestamp must be a positive integer"));
        }
        if self.duration == 0 {
            return Err(anyhow!("duration must be a positive integer"));
        }
        // The extension ends up in a Content-Disposition filename.
        if !self
            .file_extension
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        {
            return Err(anyhow!(
                "fileExtension may only contain ascii letters, digits, '.', '-' and '_'"
            ));
        }
        for (index, commit) in self.commits.iter().enumerate() {
            if commit.timestamp == 0 {
                return Err(anyhow!(
                    "commits[{}].timestamp must be a positive integer",
                    index
                ));
            }
        }
        Ok(())
    }

    pub fn into_build(self, id: BuildId, version_id: VersionId) -> Result<Build> {
        BuildBuilder::default()
            .id(id)
            .version_id(version_id)
            .label(self.build)
            .file_extension(self.file_extension)
            .result(self.result)
            .timestamp(self.timestamp)
            .duration(Some(self.duration))
            .commits(self.commits)
            .flags(self.flags)
            .build()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateMachineMetadata {
    pub db_version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_objects::tests::{mock_new_build, mock_pending_build};

    #[test]
    fn test_digests_of_known_input() {
        let digests = ContentDigests::compute(b"hello");
        assert_eq!(digests.md5, "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(
            digests.sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(digests.sha512.len(), 128);
        assert!(digests.sha512.starts_with("9b71d224bd62f378"));
        assert_eq!(digests.storage_key(), digests.md5);
    }

    #[test]
    fn test_digests_of_empty_input() {
        let digests = ContentDigests::compute(b"");
        assert_eq!(digests.md5, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            digests.sha256,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert!(!digests.is_empty());
    }

    #[test]
    fn test_digests_are_deterministic() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        assert_eq!(ContentDigests::compute(&data), ContentDigests::compute(&data));
        assert_ne!(
            ContentDigests::compute(&data),
            ContentDigests::compute(&data[1..])
        );
    }

    #[test]
    fn test_id_keys_preserve_order() {
        let small = BuildId::new(2).to_key();
        let large = BuildId::new(256).to_key();
        assert!(small < large);
        assert_eq!(BuildId::from_key(&large).unwrap(), BuildId::new(256));
        assert!(BuildId::from_key(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_version_name_key_is_scoped_to_project() {
        let a = Version::name_key_from(ProjectId::new(1), "1.0");
        let b = Version::name_key_from(ProjectId::new(2), "1.0");
        assert_ne!(a, b);
        assert!(a.starts_with(&ProjectId::new(1).to_key()));
        assert_eq!(ProjectId::from_key(&b).unwrap(), ProjectId::new(2));
    }

    #[test]
    fn test_builder_creates_pending_build() {
        let build = mock_pending_build(BuildId::new(7), VersionId::new(3), "abc");
        assert_eq!(build.state(), BuildState::Pending);
        assert!(build.digests().is_empty());
        assert_eq!(build.storage_key(), None);
        assert_eq!(build.duration, Some(5));
    }

    #[test]
    fn test_builder_requires_label() {
        let result = BuildBuilder::default()
            .id(BuildId::new(1))
            .version_id(VersionId::new(1))
            .file_extension("zip".to_string())
            .result(BuildResult::Success)
            .timestamp(1000)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_mark_ready_happens_once() {
        let mut build = mock_pending_build(BuildId::new(1), VersionId::new(1), "abc");
        let digests = ContentDigests::compute(b"hello");
        build.mark_ready(digests.clone(), 5).unwrap();
        assert_eq!(build.state(), BuildState::Ready);
        assert_eq!(build.storage_key(), Some("5d41402abc4b2a76b9719d911017c592"));
        assert_eq!(build.size_bytes, Some(5));

        let err = build.mark_ready(ContentDigests::compute(b"other"), 5);
        assert!(err.is_err());
        assert_eq!(build.digests(), digests);
    }

    #[test]
    fn test_suggested_filename() {
        let build = mock_pending_build(BuildId::new(1), VersionId::new(1), "abc");
        assert_eq!(build.suggested_filename("app", "1.0"), "app-1.0-abc.zip");
    }

    #[test]
    fn test_build_result_wire_format() {
        assert_eq!(
            serde_json::to_string(&BuildResult::Success).unwrap(),
            "\"SUCCESS\""
        );
        assert_eq!(
            serde_json::from_str::<BuildResult>("\"FAILURE\"").unwrap(),
            BuildResult::Failure
        );
        assert!(serde_json::from_str::<BuildResult>("\"success\"").is_err());
    }

    #[test]
    fn test_new_build_validation() {
        assert!(mock_new_build("app", "1.0", "abc").validate().is_ok());

        let mut empty_project = mock_new_build("", "1.0", "abc");
        assert!(empty_project.validate().is_err());
        empty_project.project = "app".to_string();
        assert!(empty_project.validate().is_ok());

        let mut zero_duration = mock_new_build("app", "1.0", "abc");
        zero_duration.duration = 0;
        assert!(zero_duration.validate().is_err());

        let mut bad_extension = mock_new_build("app", "1.0", "abc");
        bad_extension.file_extension = "zip\"; x=".to_string();
        assert!(bad_extension.validate().is_err());
        bad_extension.file_extension = "tar.gz".to_string();
        assert!(bad_extension.validate().is_ok());

        let mut bad_commit = mock_new_build("app", "1.0", "abc");
        bad_commit.commits[0].timestamp = 0;
        let err = bad_commit.validate().unwrap_err();
        assert!(err.to_string().contains("commits[0]"));
    }
}
