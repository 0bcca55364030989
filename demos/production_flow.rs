//! 報工流程示例：建議分配、部分確認、完成確認與沖銷

use chrono::{Duration, Utc};
use mes::confirm::{
    InMemoryBatchNumbering, InMemoryConfirmationRepository, InMemoryLedger, InMemoryRecipes,
    InMemoryRoster,
};
use mes::domain::BatchSizeConfig;
use mes::{
    Collaborators, ConfirmationService, EngineConfig, HolderId, InMemoryReservationManager,
    InventoryLot, MaterialRequirement, OperationContext, SubmitRequest,
};
use rust_decimal::Decimal;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    mes::telemetry::init_tracing();

    println!("=== 報工流程示例 ===\n");

    let config = EngineConfig::from_json_str(
        r#"{ "reservation_idle_timeout_secs": 600, "batch_number_format": "{product}-{date}-{seq}" }"#,
    )?;
    let now = Utc::now();

    // 庫存批次
    let ledger = Arc::new(InMemoryLedger::with_lots(vec![
        InventoryLot::new(
            "LOT-RESIN-01".to_string(),
            "RESIN".to_string(),
            Decimal::from(30),
            "kg".to_string(),
            now - Duration::days(10),
        ),
        InventoryLot::new(
            "LOT-RESIN-02".to_string(),
            "RESIN".to_string(),
            Decimal::from(40),
            "kg".to_string(),
            now - Duration::days(3),
        ),
        InventoryLot::new(
            "LOT-PIGMENT-01".to_string(),
            "PIGMENT".to_string(),
            Decimal::from(8),
            "kg".to_string(),
            now - Duration::days(5),
        ),
    ]));

    // BOM：每單位 0.5 kg 樹脂（損耗 2%）、0.05 kg 色料
    let recipes = InMemoryRecipes::new().with_recipe(
        "MIXING",
        "PASTE-01",
        vec![
            MaterialRequirement::new("RESIN".to_string(), Decimal::new(5, 1), "kg".to_string())
                .with_yield_loss_ratio(Decimal::new(102, 2)),
            MaterialRequirement::new("PIGMENT".to_string(), Decimal::new(5, 2), "kg".to_string()),
        ],
    );

    let collaborators = Collaborators {
        ledger: ledger.clone(),
        recipes: Arc::new(recipes),
        numbering: Arc::new(InMemoryBatchNumbering::from_config(&config)),
        equipment: Arc::new(InMemoryRoster::new(vec!["MIXER-01".to_string()])),
        operators: Arc::new(InMemoryRoster::new(vec!["OP-ALICE".to_string()])),
        repository: Arc::new(InMemoryConfirmationRepository::new()),
        reservations: Arc::new(InMemoryReservationManager::new()),
    };
    let batch_configs = vec![BatchSizeConfig::new(
        "MIXING".to_string(),
        "PASTE-01".to_string(),
        Decimal::from(10),
        Decimal::from(40),
        "kg".to_string(),
    )];
    let service = ConfirmationService::new(config, collaborators, batch_configs);

    let context = OperationContext::new(
        "OP-2025-001".to_string(),
        "MIXING".to_string(),
        "PASTE-01".to_string(),
        Decimal::from(100),
    );

    // 第一次報工：部分確認 60
    let mut session = service.begin_session(context.clone(), HolderId::generate())?;
    service.propose_for(&mut session, Decimal::from(60))?;

    println!("建議耗用:");
    for line in session.lines() {
        println!("  - {} ({}): {}", line.lot_id, line.material_id, line.quantity);
    }
    for warning in session.warnings() {
        println!("  ! {}", warning.message);
    }

    let preview = service.preview_split(&context, Decimal::from(60));
    println!("\n拆批預覽: {} 批", preview.batch_count());
    println!("下一個批號: {}", service.preview_batch_number(&context)?);

    let request = SubmitRequest::new(
        Decimal::from(60),
        now - Duration::hours(3),
        now - Duration::hours(1),
        "alice".to_string(),
    )
    .with_equipment(vec!["MIXER-01".to_string()])
    .with_operators(vec!["OP-ALICE".to_string()])
    .as_partial();
    let first = service.submit(&mut session, &request)?;

    println!(
        "\n報工 {}: {} 剩餘 {:?}，產出批次 {:?}",
        first.id,
        first.status,
        first.remaining_quantity,
        first.batch_numbers()
    );

    // 第二次報工：完成剩餘數量
    let mut session = service.begin_session(context.clone(), HolderId::generate())?;
    service.propose(&mut session)?;
    let request = SubmitRequest::new(
        session.target_quantity(),
        now - Duration::minutes(50),
        now - Duration::minutes(5),
        "alice".to_string(),
    )
    .with_equipment(vec!["MIXER-01".to_string()])
    .with_operators(vec!["OP-ALICE".to_string()]);
    let second = service.submit(&mut session, &request)?;

    println!(
        "報工 {}: {}，產出批次 {:?}",
        second.id,
        second.status,
        second.batch_numbers()
    );

    if let Some(progress) = service.operation_progress(&context.operation_id) {
        println!(
            "\n作業進度: {} / {}",
            progress.produced_quantity, progress.target_quantity
        );
    }

    // 沖銷第二次報工
    let eligibility = service.can_reverse(second.id)?;
    println!("\n可沖銷: {} {:?}", eligibility.eligible, eligibility.reason);
    let reversed = service.reverse(second.id, "產量輸入錯誤", None, "supervisor")?;
    println!("報工 {}: {}", reversed.id, reversed.status);

    println!("\n庫存:");
    for lot in ledger.snapshot() {
        println!("  - {} {} {} {}", lot.lot_id, lot.state, lot.quantity, lot.unit);
    }

    Ok(())
}
