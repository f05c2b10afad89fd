// Chat-facing reply texts.

/// One participant line in a flush or status summary.
pub struct SummaryLine<'a> {
    pub name: &'a str,
    pub station: &'a str,
    pub team: Option<&'a str>,
}

fn summary(lines: &[SummaryLine<'_>]) -> String {
    lines
        .iter()
        .map(|l| match l.team {
            Some(team) => format!("・{}［{}］: {}", l.name, team, l.station),
            None => format!("・{}: {}", l.name, l.station),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn help(required: usize) -> String {
    format!(
        "駅名を送ると現在地として登録します。{required}人分そろうと路線図にピンを打って送ります。\n\
         「状況」で登録状況、「リセット」で登録のやり直しができます。"
    )
}

/// Longest slice of user text echoed back in a reply, in characters.
const ECHO_LIMIT: usize = 30;

fn echo(text: &str) -> String {
    match text.char_indices().nth(ECHO_LIMIT) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

pub fn unknown_station(text: &str) -> String {
    format!(
        "「{}」は路線図にない駅です。駅名を確認してもう一度送ってください。",
        echo(text)
    )
}

pub fn duplicate(name: &str, station: &str) -> String {
    format!("{name}さんは既に「{station}」で登録済みです。")
}

pub fn registered(name: &str, station: &str, count: usize, required: usize) -> String {
    format!("{name}さんを「{station}」で登録しました。（{count}/{required}人）")
}

pub fn updated(name: &str, station: &str, count: usize, required: usize) -> String {
    format!("{name}さんの現在地を「{station}」に更新しました。（{count}/{required}人）")
}

pub fn flushed(lines: &[SummaryLine<'_>]) -> String {
    format!("全員の現在地がそろいました！\n{}", summary(lines))
}

pub fn status_empty(required: usize) -> String {
    format!("まだ誰も登録していません。（0/{required}人）")
}

pub fn status(lines: &[SummaryLine<'_>], required: usize, opened_at: &str) -> String {
    format!(
        "登録状況（{}/{required}人、{opened_at}から受付中）\n{}",
        lines.len(),
        summary(lines)
    )
}

pub fn reset_done() -> String {
    "登録をリセットしました。".to_string()
}

pub fn reset_noop() -> String {
    "リセットする登録はありません。".to_string()
}

pub fn asset_missing() -> String {
    "画像生成に失敗しました。路線図ファイルが見つかりません。登録はリセットされたので、もう一度駅名を送ってください。"
        .to_string()
}

pub fn render_failed() -> String {
    "画像生成に失敗しました。登録はリセットされたので、もう一度駅名を送ってください。".to_string()
}

pub fn upload_failed(lines: &[SummaryLine<'_>]) -> String {
    format!(
        "画像のアップロードに失敗しました。登録はリセットされたので、もう一度駅名を送ってください。\n{}",
        summary(lines)
    )
}
