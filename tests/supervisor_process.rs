//! 监督器的真实子进程测试
//!
//! 用 `cat` 充当求解器：写入的每一行会被原样回显到 stdout，
//! 关闭 stdin 后进程自然退出，可以确定性地覆盖
//! 启动 / 回显 / 退出 / 拒绝写入 的全部路径。

#![cfg(unix)]

use std::time::Duration;

use captcha_desk::error::{AppError, ProcessError};
use captcha_desk::protocol::{SolverCommand, SolverMessage};
use captcha_desk::solver::{SolverControl, SolverEvent, SolverSupervisor};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

async fn next_event(rx: &mut mpsc::UnboundedReceiver<SolverEvent>) -> SolverEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("等待事件超时")
        .expect("事件通道不应关闭")
}

#[tokio::test]
async fn test_start_echoes_handshake_and_exits_on_shutdown() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut supervisor = SolverSupervisor::new("cat", tx);

    supervisor.start("KEY-1").await.expect("启动 cat 不应失败");
    assert!(supervisor.is_running());

    // cat 把握手行原样回显：没有 status/url/sitekey，分类为无法识别
    match next_event(&mut rx).await {
        SolverEvent::Message(SolverMessage::Unrecognized(value)) => {
            assert_eq!(value["api_key"], "KEY-1");
        }
        other => panic!("应收到回显的握手行: {:?}", other),
    }

    supervisor.send(&SolverCommand::GetTask).await.expect("写入不应失败");
    match next_event(&mut rx).await {
        SolverEvent::Message(SolverMessage::Unrecognized(value)) => {
            assert_eq!(value["command"], "get_task");
        }
        other => panic!("应收到回显的命令行: {:?}", other),
    }

    // 关闭输入通道后 cat 自然退出
    supervisor.shutdown().await;
    match next_event(&mut rx).await {
        SolverEvent::Exited { code } => assert_eq!(code, Some(0)),
        other => panic!("应收到退出事件: {:?}", other),
    }
    assert!(!supervisor.is_running());

    // 退出后的写入降级为 NotRunning，不崩溃
    let err = supervisor
        .send(&SolverCommand::GetTask)
        .await
        .expect_err("退出后写入应失败");
    assert!(matches!(
        err,
        AppError::Process(ProcessError::NotRunning)
    ));
}

#[tokio::test]
async fn test_second_start_is_rejected_while_alive() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut supervisor = SolverSupervisor::new("cat", tx);

    supervisor.start("KEY").await.expect("启动不应失败");
    let err = supervisor.start("KEY").await.expect_err("重复启动应被拒绝");
    assert!(matches!(
        err,
        AppError::Process(ProcessError::AlreadyRunning)
    ));

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_send_without_start_is_not_running() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut supervisor = SolverSupervisor::new("cat", tx);

    let err = supervisor
        .send(&SolverCommand::GetTask)
        .await
        .expect_err("未启动时写入应失败");
    assert!(matches!(
        err,
        AppError::Process(ProcessError::NotRunning)
    ));
}

#[tokio::test]
async fn test_missing_binary_is_spawn_failure() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut supervisor = SolverSupervisor::new("/nonexistent/captcha_cli_missing", tx);

    let err = supervisor.start("KEY").await.expect_err("缺失的二进制应启动失败");
    assert!(matches!(
        err,
        AppError::Process(ProcessError::SpawnFailed { .. })
    ));
    assert!(!supervisor.is_running());
}

#[tokio::test]
async fn test_restart_after_exit_spawns_fresh_process() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut supervisor = SolverSupervisor::new("cat", tx);

    supervisor.start("KEY").await.expect("启动不应失败");
    let _ = next_event(&mut rx).await; // 回显的握手
    supervisor.shutdown().await;
    loop {
        if let SolverEvent::Exited { .. } = next_event(&mut rx).await {
            break;
        }
    }

    // 退出后允许重新启动，且新进程先收到握手
    supervisor.start("KEY-2").await.expect("重启不应失败");
    match next_event(&mut rx).await {
        SolverEvent::Message(SolverMessage::Unrecognized(value)) => {
            assert_eq!(value["api_key"], "KEY-2");
        }
        other => panic!("应收到新进程回显的握手行: {:?}", other),
    }
    supervisor.shutdown().await;
}

/// 需要真实的求解器二进制：cargo test -- --ignored
#[tokio::test]
#[ignore]
async fn test_against_real_solver_binary() {
    let _ = tracing_subscriber::fmt::try_init();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut supervisor = SolverSupervisor::new("./captcha_cli", tx);
    supervisor.start("test-key").await.expect("启动求解器失败");
    supervisor.send(&SolverCommand::GetTask).await.expect("请求任务失败");

    let event = timeout(Duration::from_secs(30), rx.recv()).await;
    println!("求解器事件: {:?}", event);
}
