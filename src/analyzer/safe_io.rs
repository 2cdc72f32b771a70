use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::Builder;

/// 原子写入报告文件：先写同目录下的临时文件，再 rename 到目标路径。
///
/// `safe_mode` 下拒绝写入符号链接目标，写入前后各检查一次。
pub fn atomic_write_bytes(path: &Path, data: &[u8], safe_mode: bool) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        Some(_) => Path::new("."),
        None => return Err(anyhow!("报告路径缺少父目录: {}", path.display())),
    };

    if safe_mode {
        reject_symlink(path)?;
    }

    let mut tmp = Builder::new()
        .prefix(".video_to_audio_tmp_")
        .tempfile_in(parent)
        .with_context(|| format!("无法在输出目录中创建临时报告: {}", parent.display()))?;

    tmp.write_all(data)
        .with_context(|| format!("写入临时报告失败: {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("同步临时报告失败: {}", path.display()))?;

    if safe_mode {
        reject_symlink(path)?;
    }

    tmp.persist(path)
        .map_err(|e| anyhow!(e.error))
        .with_context(|| format!("报告写入失败: {}", path.display()))?;

    Ok(())
}

fn reject_symlink(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_symlink() => Err(anyhow!(
            "报告路径是符号链接，已拒绝写入: {}",
            path.display()
        )),
        Ok(_) | Err(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_replaces_existing_report() {
        let dir = TempDir::new().expect("tempdir");
        let output = dir.path().join("conversion_report.csv");
        std::fs::write(&output, "old").expect("seed report");

        atomic_write_bytes(&output, "源文件,状态\n".as_bytes(), true).expect("write failed");
        let content = std::fs::read_to_string(&output).expect("read failed");
        assert_eq!(content, "源文件,状态\n");

        let leftovers = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".video_to_audio_tmp_"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_atomic_write_reject_symlink() {
        use std::os::unix::fs::symlink;

        let dir = TempDir::new().expect("tempdir");
        let target = dir.path().join("target.csv");
        std::fs::write(&target, "old").expect("write old");

        let link = dir.path().join("conversion_report.csv");
        symlink(&target, &link).expect("symlink");

        let err = atomic_write_bytes(&link, b"new", true).expect_err("should reject symlink");
        assert!(err.to_string().contains("符号链接"));
        let content = std::fs::read_to_string(&target).expect("read target");
        assert_eq!(content, "old");
    }
}
