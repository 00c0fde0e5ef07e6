use indicatif::{ProgressBar, ProgressStyle};

/// ビルドとプッシュのスピナー表示
pub struct BuildProgress {
    progress_bar: ProgressBar,
}

impl BuildProgress {
    pub fn new(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            pb.set_style(style);
        }
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        pb.set_message(message.to_string());

        Self { progress_bar: pb }
    }

    /// 描画しないスピナー (テスト・非対話環境用)
    pub fn hidden() -> Self {
        Self {
            progress_bar: ProgressBar::hidden(),
        }
    }

    pub fn set_message(&self, msg: &str) {
        self.progress_bar.set_message(msg.to_string());
    }

    /// 他の出力と重ならないように1行表示
    pub fn println(&self, line: &str) {
        self.progress_bar.println(line);
    }

    pub fn finish_success(&self, message: &str) {
        self.progress_bar
            .finish_with_message(format!("{} ✓", message));
    }

    pub fn finish_error(&self, error: &str) {
        self.progress_bar
            .finish_with_message(format!("失敗: {}", error));
    }

    pub fn finish_and_clear(&self) {
        self.progress_bar.finish_and_clear();
    }
}
