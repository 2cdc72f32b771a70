use std::path::{Path, PathBuf};

use crate::error::NamingError;

/// `AppendSuffix` 策略附加在文件名主干后的固定后缀。
pub const CONVERTED_SUFFIX: &str = "_converted";

/// 编号上限：保证三位补零宽度不会溢出。
pub const MAX_DISAMBIGUATOR: u32 = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingPolicy {
    /// `clip.mp4` -> `clip.mp3`
    KeepOriginalStem,
    /// `clip.mp4` -> `clip_converted.mp3`
    AppendSuffix,
}

impl NamingPolicy {
    pub fn from_keep_original_name(keep_original_name: bool) -> Self {
        if keep_original_name {
            NamingPolicy::KeepOriginalStem
        } else {
            NamingPolicy::AppendSuffix
        }
    }
}

/// 由输入路径推导出不冲突的输出路径。
///
/// 纯路径计算：不会创建或修改输出目录，存在性判断完全委托给调用方传入的 `exists_check`。
#[derive(Debug, Clone)]
pub struct OutputNamer {
    output_folder: PathBuf,
    policy: NamingPolicy,
    overwrite: bool,
    extension: String,
}

impl OutputNamer {
    pub fn new(output_folder: impl Into<PathBuf>, policy: NamingPolicy, overwrite: bool) -> Self {
        Self {
            output_folder: output_folder.into(),
            policy,
            overwrite,
            extension: "mp3".to_string(),
        }
    }

    /// 计算输出路径。
    ///
    /// 不允许覆盖且基础路径已存在时，从 `001` 开始逐个递增编号，返回第一个不存在的路径。
    /// 搜索是单调的，不会跳号：同样的存在性状态总是得到同样的结果。
    pub fn name<F>(&self, input_path: &Path, exists_check: F) -> Result<PathBuf, NamingError>
    where
        F: Fn(&Path) -> bool,
    {
        let stem = self.stem_for(input_path);
        let base_path = self.candidate(&stem, None);

        if self.overwrite || !exists_check(&base_path) {
            return Ok(base_path);
        }

        for counter in 1..=MAX_DISAMBIGUATOR {
            let candidate = self.candidate(&stem, Some(counter));
            if !exists_check(&candidate) {
                log::info!(
                    "文件已存在，创建编号版本: {}",
                    candidate
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default()
                );
                return Ok(candidate);
            }
        }

        Err(NamingError::Exhausted {
            stem,
            limit: MAX_DISAMBIGUATOR,
        })
    }

    fn stem_for(&self, input_path: &Path) -> String {
        let original = input_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        match self.policy {
            NamingPolicy::KeepOriginalStem => original,
            NamingPolicy::AppendSuffix => format!("{original}{CONVERTED_SUFFIX}"),
        }
    }

    fn candidate(&self, stem: &str, counter: Option<u32>) -> PathBuf {
        let file_name = match counter {
            Some(n) => format!("{stem}_{n:03}.{}", self.extension),
            None => format!("{stem}.{}", self.extension),
        };
        self.output_folder.join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn existing(names: &[&str]) -> HashSet<PathBuf> {
        names.iter().map(|n| Path::new("out").join(n)).collect()
    }

    #[test]
    fn test_keep_original_name_no_collision() {
        let namer = OutputNamer::new("out", NamingPolicy::KeepOriginalStem, false);
        let path = namer.name(Path::new("in/clip.mp4"), |_| false).expect("naming failed");
        assert_eq!(path, Path::new("out").join("clip.mp3"));
    }

    #[test]
    fn test_collision_picks_001() {
        let namer = OutputNamer::new("out", NamingPolicy::KeepOriginalStem, false);
        let taken = existing(&["clip.mp3"]);
        let path = namer
            .name(Path::new("in/clip.mp4"), |p| taken.contains(p))
            .expect("naming failed");
        assert_eq!(path, Path::new("out").join("clip_001.mp3"));
    }

    #[test]
    fn test_suffix_policy_and_collision() {
        let namer = OutputNamer::new("out", NamingPolicy::AppendSuffix, false);
        let path = namer.name(Path::new("clip.mp4"), |_| false).expect("naming failed");
        assert_eq!(path, Path::new("out").join("clip_converted.mp3"));

        let taken = existing(&["clip_converted.mp3", "clip_converted_001.mp3"]);
        let path = namer
            .name(Path::new("clip.mp4"), |p| taken.contains(p))
            .expect("naming failed");
        assert_eq!(path, Path::new("out").join("clip_converted_002.mp3"));
    }

    #[test]
    fn test_search_never_skips_a_gap() {
        // 003 已存在但 002 空缺：必须返回 002，而不是跳到 004
        let namer = OutputNamer::new("out", NamingPolicy::KeepOriginalStem, false);
        let taken = existing(&["clip.mp3", "clip_001.mp3", "clip_003.mp3"]);
        let path = namer
            .name(Path::new("clip.mp4"), |p| taken.contains(p))
            .expect("naming failed");
        assert_eq!(path, Path::new("out").join("clip_002.mp3"));
        assert!(!taken.contains(&path));
    }

    #[test]
    fn test_naming_is_idempotent() {
        let namer = OutputNamer::new("out", NamingPolicy::KeepOriginalStem, false);
        let taken = existing(&["clip.mp3", "clip_001.mp3"]);
        let first = namer.name(Path::new("clip.mp4"), |p| taken.contains(p));
        let second = namer.name(Path::new("clip.mp4"), |p| taken.contains(p));
        assert_eq!(first, second);
    }

    #[test]
    fn test_overwrite_always_returns_base_path() {
        let namer = OutputNamer::new("out", NamingPolicy::KeepOriginalStem, true);
        let path = namer.name(Path::new("clip.mp4"), |_| true).expect("naming failed");
        assert_eq!(path, Path::new("out").join("clip.mp3"));
    }

    #[test]
    fn test_exhausted_counter_fails() {
        let namer = OutputNamer::new("out", NamingPolicy::KeepOriginalStem, false);
        let err = namer
            .name(Path::new("clip.mp4"), |_| true)
            .expect_err("all names taken");
        assert_eq!(
            err,
            NamingError::Exhausted {
                stem: "clip".to_string(),
                limit: MAX_DISAMBIGUATOR
            }
        );
    }

    #[test]
    fn test_naming_does_not_touch_filesystem() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let output_folder = dir.path().join("not_created_yet");
        let namer = OutputNamer::new(&output_folder, NamingPolicy::KeepOriginalStem, false);
        let path = namer
            .name(Path::new("clip.mp4"), |p| p.exists())
            .expect("naming failed");
        assert_eq!(path, output_folder.join("clip.mp3"));
        assert!(!output_folder.exists());
    }
}
