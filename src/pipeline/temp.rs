use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// 中间 WAV 文件名。条目严格串行处理，所以同一输出目录下只需要一个固定名字。
pub const TEMP_AUDIO_FILE_NAME: &str = "_temp_audio.wav";

/// 中间音频产物的作用域守卫。
///
/// 获取时只确定路径，释放（`Drop`）时尽力删除文件：成功、任何失败路径、panic 展开
/// 和中断都会经过这里。删除失败只记录日志，绝不向上传播。
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    pub fn acquire(output_folder: &Path) -> Self {
        let path = output_folder.join(TEMP_AUDIO_FILE_NAME);
        // 上一次运行被强杀时可能留下残留文件，提取器需要一个干净的起点
        remove_best_effort(&path);
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        remove_best_effort(&self.path);
    }
}

fn remove_best_effort(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => log::debug!("临时文件已删除: {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => log::warn!("无法删除临时文件 {}: {e}", path.display()),
    }
}
