//! # bitmap-query-engine 使用案例
//!
//! 1. 把几列未压缩位图压成 WAH32 写入临时目录
//! 2. 从配置启动 QueryEngine
//! 3. 执行点查询 / 范围查询
//! 4. 查看缓存统计
//! 5. 批量执行一份查询集文本

use bitmap_query_engine::{
    storage::DirectoryStorage,
    workload::QuerySet,
    BitmapEncoding, CompressedColumn, EngineConfig, Query, QueryEngine,
};

fn main() -> bitmap_query_engine::Result<()> {
    env_logger::init();

    println!("═══════════════════════════════════════════════════════════");
    println!("   bitmap-query-engine 演示                                ");
    println!("═══════════════════════════════════════════════════════════\n");

    // =========================================================================
    // 1. 生成列文件：属性 A 的 6 个分箱，每行恰好落入一个分箱
    // =========================================================================
    let data_dir = std::env::temp_dir().join("bitmap-query-demo");
    std::fs::create_dir_all(&data_dir)?;
    let config  = EngineConfig::with_data_dir(&data_dir);
    let storage = DirectoryStorage::from_config(&config);
    let codec   = config.encoding.codec();

    let rows = 10_000usize;
    println!("【1】写入 6 列，每列 {rows} 行 → {}", data_dir.display());
    for bin in 0..6u32 {
        // 分箱按行号的区间划分，前几列会出现大段 0/1 fill
        let bits: Vec<bool> = (0..rows).map(|r| (r * 6 / rows) as u32 == bin || r % 97 == bin as usize).collect();
        let col = CompressedColumn::from_bits(bin.to_string(), codec, &bits);
        let n = storage.write_column(bin, &col, BitmapEncoding::Wah32)?;
        println!("    col_{bin}.dat  {:>5} words  {n:>6} bytes  ones={}", col.word_count(), col.count_ones());
    }
    println!();

    // =========================================================================
    // 2. 启动 QueryEngine
    // =========================================================================
    println!("【2】启动 QueryEngine (encoding={}) ...", config.encoding);
    let engine = QueryEngine::from_config(&config);
    println!("    ✓ OK\n");

    // =========================================================================
    // 3. 点查询 / 范围查询
    // =========================================================================
    println!("【3】执行查询 ...");
    for text in ["[p,&,0,1]", "[p,|,3,2]", "[r,|,0,5]", "[r,&,1,2]"] {
        let q: Query = text.parse()?;
        let r = engine.execute(&q)?;
        println!("    {:<12} → {:>5} words  ones={:<6} digest={:08x}", q.to_string(), r.word_count(), r.count_ones(), r.digest());
    }
    println!();

    // =========================================================================
    // 4. 缓存统计
    // =========================================================================
    let stats = engine.cache().stats();
    println!("【4】缓存：{} 列常驻，hits={} loads={}\n", engine.cache().len(), stats.hits, stats.loads);

    // =========================================================================
    // 5. 查询集
    // =========================================================================
    println!("【5】批量执行查询集 ...");
    let text = "# demo workload\n[p,&,0,5]\n[r,|,1,4]\n[p,|,4,4]\n";
    let queries: Vec<Query> = QuerySet::from_reader(text.as_bytes()).collect::<bitmap_query_engine::Result<_>>()?;
    let (results, summary) = engine.run_workload_parallel(&queries)?;
    for outcome in results.into_iter().flatten() {
        println!("    {outcome}");
    }
    println!("    {summary}");

    Ok(())
}
