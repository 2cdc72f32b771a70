use std::sync::atomic::{AtomicBool, Ordering};

// 信号处理器只置位，真正的清理由编排器在当前条目退出时完成
static INTERRUPT_REQUESTED: AtomicBool = AtomicBool::new(false);

pub fn is_requested() -> bool {
    INTERRUPT_REQUESTED.load(Ordering::Relaxed)
}

#[cfg(unix)]
extern "C" fn handle_signal(_sig: libc::c_int) {
    INTERRUPT_REQUESTED.store(true, Ordering::Relaxed);
}

/// 注册 SIGINT / SIGTERM 处理器。
#[cfg(unix)]
pub fn install() {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = handle_signal as usize;
        sa.sa_flags = 0;
        libc::sigemptyset(&mut sa.sa_mask);

        libc::sigaction(libc::SIGINT, &sa, std::ptr::null_mut());
        libc::sigaction(libc::SIGTERM, &sa, std::ptr::null_mut());
    }
}

#[cfg(not(unix))]
pub fn install() {
    log::debug!("当前平台不支持信号处理，Ctrl+C 将直接结束进程");
}
