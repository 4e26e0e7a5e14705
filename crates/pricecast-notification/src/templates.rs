//! 알람 메시지 템플릿.

use rust_decimal::Decimal;

use pricecast_core::{AlarmKind, DecimalExt};

/// 메시지 렌더링 입력.
#[derive(Debug, Clone)]
pub struct MessageContext<'a> {
    /// 상품 표시 이름
    pub display_name: &'a str,
    /// 결정에 쓴 확률
    pub probability: f64,
    /// 예측 누적 순변동
    pub net_amount: Option<Decimal>,
    /// 예측 창 길이 (일)
    pub horizon_days: u32,
}

fn kind_emoji(kind: AlarmKind) -> &'static str {
    match kind {
        AlarmKind::Consistent => "⚠️",
        AlarmKind::Volatile => "⚡",
        AlarmKind::Gradual => "📊",
        AlarmKind::NoChange => "✅",
        AlarmKind::AlreadyHappened => "ℹ️",
        AlarmKind::Deterministic => "🔴",
    }
}

fn direction_word(net: Option<Decimal>) -> &'static str {
    match net {
        Some(n) if n > Decimal::ZERO => "상승",
        Some(n) if n < Decimal::ZERO => "하락",
        _ => "변동",
    }
}

/// 알람 유형별 사용자 메시지를 만듭니다.
pub fn render_message(kind: AlarmKind, ctx: &MessageContext<'_>) -> String {
    let emoji = kind_emoji(kind);
    let name = ctx.display_name;
    let days = ctx.horizon_days;
    let pct = format!("{:.0}", ctx.probability * 100.0);
    let net = ctx
        .net_amount
        .map(|n| format!("{:.2}", n.abs().round_half_up(2)))
        .unwrap_or_else(|| "?".to_string());
    let direction = direction_word(ctx.net_amount);

    match kind {
        AlarmKind::Consistent => format!(
            "{emoji} {name} 가격 알람: \
             향후 {days}일 내 약 {net} {direction} 예상. \
             모델 신뢰도 {pct}%. \
             방향과 크기가 일관된 강한 신호입니다."
        ),
        AlarmKind::Volatile => format!(
            "{emoji} {name} 가격 주의: \
             혼재된 신호가 감지되었습니다. \
             첫 변동과 {days}일 누적 변동의 방향이 다릅니다. \
             모델 신뢰도 {pct}%. 주의 깊게 지켜보세요."
        ),
        AlarmKind::Gradual => format!(
            "{emoji} {name} 가격 안내: \
             작지만 일관된 {direction} 예상 (약 {net}). \
             모델 신뢰도 {pct}%. \
             점진적 변동 신호입니다."
        ),
        AlarmKind::NoChange => format!(
            "{emoji} {name}: \
             향후 {days}일간 뚜렷한 가격 변동은 예상되지 않습니다. \
             모델 신뢰도 {pct}%."
        ),
        AlarmKind::AlreadyHappened => format!(
            "{emoji} {name}: \
             오늘 이미 가격 변경이 있었습니다. \
             다음 알람 평가는 내일 진행됩니다."
        ),
        AlarmKind::Deterministic => format!(
            "{emoji} {name} 결정적 알람: \
             ML 모델과 무관하게 비용 지표가 가격 변동 신호를 보냅니다. \
             시장 조건이 변동 임계값을 넘었습니다."
        ),
    }
}
