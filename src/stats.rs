//! Месячная аналитика: воронка новых пользователей и выручка.

use crate::db::NewUserRow;
use crate::tariff::Tariff;
use chrono::{DateTime, Utc};

const ALL_TARIFFS: [Tariff; 5] = [
    Tariff::Days30,
    Tariff::Days90,
    Tariff::Days120,
    Tariff::Days180,
    Tariff::White30,
];

/// Тестовый платёж админа, не попадает в выручку.
const ADMIN_TEST_RUB: i64 = 1;
const ADMIN_TEST_CRYPTO: f64 = 0.02;

#[derive(Debug, Default, Clone, Copy)]
pub struct FunnelSplit {
    pub total: i64,
    pub campaign: i64,
    pub organic: i64,
}

impl FunnelSplit {
    fn add(&mut self, campaign: bool) {
        self.total += 1;
        if campaign {
            self.campaign += 1;
        } else {
            self.organic += 1;
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct MonthlyReport {
    pub new_users: FunnelSplit,
    pub paid: FunnelSplit,
    pub connected: FunnelSplit,
    pub revenue_rub: i64,
    pub payments_count: i64,
    pub bucket_99: i64,
    pub bucket_269: i64,
    pub bucket_299: i64,
    pub bucket_499: i64,
    pub gifts: i64,
    /// Новые пользователи по четырём отрезкам месяца.
    pub week_signups: [i64; 4],
}

impl MonthlyReport {
    pub fn average_check(&self) -> f64 {
        if self.payments_count == 0 {
            0.0
        } else {
            self.revenue_rub as f64 / self.payments_count as f64
        }
    }

    pub fn arpu(&self) -> f64 {
        if self.new_users.total == 0 {
            0.0
        } else {
            self.revenue_rub as f64 / self.new_users.total as f64
        }
    }
}

/// Платёж в Stars, сведённый к рублёвому тарифу.
pub fn stars_to_rub(amount: i64) -> Option<i64> {
    ALL_TARIFFS
        .iter()
        .find(|tariff| tariff.price_stars() == amount)
        .map(|tariff| tariff.price_rub())
}

/// Криптоплатёж, сведённый к рублёвому тарифу.
pub fn crypto_to_rub(amount: f64, currency: &str) -> Option<i64> {
    let price_of = |tariff: &Tariff| match currency {
        "TON" => tariff.price_ton(),
        "USDT" => tariff.price_usdt(),
        _ => return f64::NAN,
    };
    ALL_TARIFFS
        .iter()
        .find(|tariff| (price_of(tariff) - amount).abs() < 0.001)
        .map(|tariff| tariff.price_rub())
}

fn is_campaign(user: &NewUserRow, campaign_refs: &[String]) -> bool {
    if user.stamp.as_deref().is_some_and(|stamp| !stamp.is_empty()) {
        return true;
    }
    user.ref_id
        .as_deref()
        .is_some_and(|ref_id| campaign_refs.iter().any(|r| r == ref_id))
}

pub fn build_monthly_report(
    users: &[NewUserRow],
    rub_amounts: &[i64],
    stars_amounts: &[i64],
    crypto_amounts: &[(f64, String)],
    gifts: i64,
    campaign_refs: &[String],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> MonthlyReport {
    let mut report = MonthlyReport {
        gifts,
        ..MonthlyReport::default()
    };

    let span = (to - from).num_seconds().max(1);
    for user in users {
        let campaign = is_campaign(user, campaign_refs);
        report.new_users.add(campaign);
        if user.is_paid {
            report.paid.add(campaign);
        }
        if user.is_connected {
            report.connected.add(campaign);
        }
        let offset = (user.created_at - from.timestamp()).clamp(0, span - 1);
        let quarter = (offset * 4 / span).clamp(0, 3) as usize;
        report.week_signups[quarter] += 1;
    }

    let mut add_rub = |rub: i64| {
        report.revenue_rub += rub;
        report.payments_count += 1;
        match rub {
            99 => report.bucket_99 += 1,
            269 => report.bucket_269 += 1,
            299 => report.bucket_299 += 1,
            499 => report.bucket_499 += 1,
            _ => {}
        }
    };

    for &amount in rub_amounts {
        if amount != ADMIN_TEST_RUB {
            add_rub(amount);
        }
    }
    for &amount in stars_amounts {
        if let Some(rub) = stars_to_rub(amount) {
            add_rub(rub);
        }
    }
    for (amount, currency) in crypto_amounts {
        if *amount > ADMIN_TEST_CRYPTO {
            if let Some(rub) = crypto_to_rub(*amount, currency) {
                add_rub(rub);
            }
        }
    }

    report
}

pub fn render_monthly_report(report: &MonthlyReport, month_label: &str) -> String {
    format!(
        "📈 <b>Аналитика за {}</b>\n\n\
         <b>Новые пользователи</b>\n\
         ├ всего: {}\n\
         ├ с рекламы: {}\n\
         └ сарафан: {}\n\n\
         <b>Оплатили</b>\n\
         ├ всего: {}\n\
         ├ с рекламы: {}\n\
         └ сарафан: {}\n\n\
         <b>Подключились</b>\n\
         ├ всего: {}\n\
         ├ с рекламы: {}\n\
         └ сарафан: {}\n\n\
         <b>Деньги</b>\n\
         ├ выручка: {} руб\n\
         ├ платежей: {}\n\
         ├ средний чек: {:.0} руб\n\
         └ ARPU: {:.1} руб\n\n\
         <b>Тарифы</b>\n\
         ├ 99: {}\n\
         ├ 269: {}\n\
         ├ 299: {}\n\
         ├ 499: {}\n\
         └ подарки: {}\n\n\
         <b>Регистрации по неделям</b>\n\
         {} / {} / {} / {}",
        month_label,
        report.new_users.total,
        report.new_users.campaign,
        report.new_users.organic,
        report.paid.total,
        report.paid.campaign,
        report.paid.organic,
        report.connected.total,
        report.connected.campaign,
        report.connected.organic,
        report.revenue_rub,
        report.payments_count,
        report.average_check(),
        report.arpu(),
        report.bucket_99,
        report.bucket_269,
        report.bucket_299,
        report.bucket_499,
        report.gifts,
        report.week_signups[0],
        report.week_signups[1],
        report.week_signups[2],
        report.week_signups[3],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn user(created_at: i64, stamp: Option<&str>, ref_id: Option<&str>, paid: bool) -> NewUserRow {
        NewUserRow {
            user_id: 1,
            ref_id: ref_id.map(str::to_string),
            stamp: stamp.map(str::to_string),
            is_paid: paid,
            is_connected: false,
            created_at,
        }
    }

    #[test]
    fn conversion_tables_cover_all_tariffs() {
        assert_eq!(stars_to_rub(66), Some(99));
        assert_eq!(stars_to_rub(179), Some(269));
        assert_eq!(stars_to_rub(199), Some(299));
        assert_eq!(stars_to_rub(333), Some(499));
        assert_eq!(stars_to_rub(500), None);

        assert_eq!(crypto_to_rub(0.9, "TON"), Some(99));
        assert_eq!(crypto_to_rub(4.6, "TON"), Some(499));
        assert_eq!(crypto_to_rub(3.5, "USDT"), Some(269));
        assert_eq!(crypto_to_rub(4.0, "USDT"), Some(299));
        assert_eq!(crypto_to_rub(4.0, "BTC"), None);
    }

    #[test]
    fn campaign_traffic_is_split_from_organic() {
        let from = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        let campaign_refs = vec!["555".to_string()];
        let users = vec![
            user(from.timestamp(), Some("promo"), None, true),
            user(from.timestamp() + 100, None, Some("555"), false),
            user(from.timestamp() + 200, None, Some("777"), true),
            user(from.timestamp() + 300, None, None, false),
        ];
        let report =
            build_monthly_report(&users, &[], &[], &[], 0, &campaign_refs, from, to);
        assert_eq!(report.new_users.total, 4);
        assert_eq!(report.new_users.campaign, 2);
        assert_eq!(report.new_users.organic, 2);
        assert_eq!(report.paid.total, 2);
        assert_eq!(report.paid.campaign, 1);
    }

    #[test]
    fn revenue_skips_test_payments_and_converts() {
        let from = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        let crypto = vec![(2.5, "TON".to_string()), (0.02, "TON".to_string())];
        let report = build_monthly_report(
            &[],
            &[99, 1, 499],
            &[179],
            &crypto,
            2,
            &[],
            from,
            to,
        );
        // 99 + 499 + 269 (stars) + 269 (TON); тестовые 1 руб и 0.02 TON отброшены
        assert_eq!(report.revenue_rub, 1136);
        assert_eq!(report.payments_count, 4);
        assert_eq!(report.bucket_269, 2);
        assert_eq!(report.bucket_499, 1);
        assert_eq!(report.gifts, 2);
        assert!((report.average_check() - 284.0).abs() < 0.01);
    }

    #[test]
    fn signups_fall_into_month_quarters() {
        let from = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2026, 8, 29, 0, 0, 0).unwrap();
        let week = 7 * 86_400;
        let users = vec![
            user(from.timestamp(), None, None, false),
            user(from.timestamp() + week, None, None, false),
            user(from.timestamp() + 2 * week, None, None, false),
            user(from.timestamp() + 3 * week + 100, None, None, false),
        ];
        let report = build_monthly_report(&users, &[], &[], &[], 0, &[], from, to);
        assert_eq!(report.week_signups, [1, 1, 1, 1]);
    }
}
