//! End-to-end tests against an in-memory SQLite mirror of the WRDS tables.

use approx::assert_relative_eq;
use polars::prelude::*;
use wrds_query::{
    CrspOptions, DatasetOptions, Fetch, FetchOptions, FundaOptions, FundqOptions, GuidanceOptions,
    NamesOptions, QueryError, QueryExecutor, QuerySession, SqliteBackend,
};

const MIRROR: &str = "
CREATE TABLE funda (
    gvkey TEXT, datadate DATE, indfmt TEXT, datafmt TEXT, popsrc TEXT, consol TEXT,
    seq REAL, ceq REAL, pstk REAL, at REAL, lt REAL, txditc REAL, txdb REAL,
    pstkrv REAL, pstkl REAL
);
INSERT INTO funda VALUES
    ('001004', '2019-12-31', 'INDL', 'STD', 'D', 'C', 50, 45, 2, 100, 50, 5, NULL, NULL, NULL),
    ('001004', '2020-12-31', 'INDL', 'STD', 'D', 'C', NULL, 60, NULL, 150, 80, NULL, 3, NULL, 1),
    ('001004', '2020-12-31', 'FS', 'STD', 'D', 'C', 1, 1, 1, 1, 1, 1, 1, 1, 1),
    ('009999', '2020-12-31', 'INDL', 'STD', 'D', 'C', 10, 10, 0, 20, 10, 0, 0, 0, 0);

CREATE TABLE fundq (
    gvkey TEXT, datadate DATE, rdq DATE, indfmt TEXT, datafmt TEXT, popsrc TEXT, consol TEXT,
    ibq REAL, atq REAL
);
INSERT INTO fundq VALUES
    ('001004', '2020-06-30', '2020-10-15', 'INDL', 'STD', 'D', 'C', 1.0, 10.0),
    ('001004', '2020-09-30', '2021-08-01', 'INDL', 'STD', 'D', 'C', 2.0, 12.0);

CREATE TABLE ccmxpf_linktable (
    gvkey TEXT, linkprim TEXT, linktype TEXT, lpermno INTEGER, lpermco INTEGER,
    usedflag INTEGER, linkdt DATE, linkenddt DATE
);
INSERT INTO ccmxpf_linktable VALUES
    ('001004', 'P', 'LC', 10001, 20001, 1, '1990-01-01', NULL),
    ('001004', 'J', 'LC', 10009, 20009, 1, '1990-01-01', NULL),
    ('009999', 'P', 'NR', 10002, 20002, 1, NULL, NULL);

CREATE TABLE msf (
    permno INTEGER, permco INTEGER, date DATE, prc REAL, shrout REAL, ret REAL, retx REAL
);
INSERT INTO msf VALUES
    (10001, 20001, '2000-06-30', -10.0, 100.0, 0.0, 0.0),
    (10001, 20001, '2000-07-31', 11.0, 100.0, 0.1, 0.1),
    (10001, 20001, '2000-08-31', 11.55, 100.0, 0.05, 0.05);

CREATE TABLE senames (
    permno INTEGER, namedt DATE, nameendt DATE, ticker TEXT, ncusip TEXT,
    shrcd INTEGER, exchcd INTEGER
);
INSERT INTO senames VALUES (10001, '1990-01-01', '2010-12-31', 'ABC', '00000001', 10, 1);

CREATE TABLE sedelist (permno INTEGER, dlstdt DATE, dlret REAL);
INSERT INTO sedelist VALUES (10001, '2000-08-15', -0.5);

CREATE TABLE msenames (
    permno INTEGER, permco INTEGER, namedt DATE, nameendt DATE, comnam TEXT
);
INSERT INTO msenames VALUES
    (10001, 20001, '1991-01-01', '1999-12-31', 'ABC CORP'),
    (10001, 20001, '2000-01-01', '2005-12-31', 'ABC CORP');

CREATE TABLE guidancenew (
    ibesticker TEXT, cusiporsedol TEXT, announcedatetime TIMESTAMP, periodyear INTEGER,
    periodmonth INTEGER, measure TEXT, value1 REAL, value2 REAL
);
INSERT INTO guidancenew VALUES
    ('ABC', '00000001', '2020-01-02 16:00:00', 2020, 12, 'EPS', 1.0, 1.2),
    ('ABC', '00000001', '1990-01-02 16:00:00', 1990, 12, 'EPS', 0.5, 0.6);
";

fn mirror() -> SqliteBackend {
    let backend = SqliteBackend::in_memory().unwrap();
    backend.connection().execute_batch(MIRROR).unwrap();
    backend
}

fn floats(frame: &DataFrame, column: &str) -> Vec<Option<f64>> {
    frame
        .column(column)
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .collect()
}

fn strings(frame: &DataFrame, column: &str) -> Vec<Option<String>> {
    frame
        .column(column)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|s| s.map(str::to_string))
        .collect()
}

fn sorted(frame: DataFrame, by: &str) -> DataFrame {
    frame
        .lazy()
        .sort([by], Default::default())
        .collect()
        .unwrap()
}

#[test]
fn test_funda_panel() {
    let options = DatasetOptions::Funda(FundaOptions {
        ag: true,
        ..FundaOptions::default()
    });
    let mut session = QuerySession::build(mirror(), &options).unwrap();
    let panel = session.read_frame().unwrap();

    assert_eq!(panel.height(), 2);
    assert_eq!(panel.get_column_names()[0].as_str(), "gvkey");
    assert_eq!(panel.get_column_names()[1].as_str(), "date");

    let dates: Vec<Option<String>> = panel
        .column("date")
        .unwrap()
        .cast(&DataType::String)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|s| s.map(str::to_string))
        .collect();
    assert_eq!(
        dates,
        vec![Some("2020-06-30".to_string()), Some("2021-06-30".to_string())]
    );

    let be = floats(&panel, "be");
    assert_relative_eq!(be[0].unwrap(), 50.0 + 5.0 - 2.0);
    assert_relative_eq!(be[1].unwrap(), 60.0 + 3.0 - 1.0);

    let ag = floats(&panel, "ag");
    assert_eq!(ag[0], None);
    assert_relative_eq!(ag[1].unwrap(), 0.5, epsilon = 1e-12);

    let lpermno: Vec<Option<i64>> = panel
        .column("lpermno")
        .unwrap()
        .i64()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(lpermno, vec![Some(10001), Some(10001)]);
}

#[test]
fn test_fundq_announcement_dates() {
    let options = DatasetOptions::Fundq(FundqOptions::default());
    let mut session = QuerySession::build(mirror(), &options).unwrap();
    let panel = sorted(session.read_frame().unwrap(), "datadate");

    let dates: Vec<Option<String>> = panel
        .column("date")
        .unwrap()
        .cast(&DataType::String)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|s| s.map(str::to_string))
        .collect();
    // 2020-06-30 + 3 month ends = 2020-09-30, overridden by rdq 2020-10-15;
    // 2020-09-30 + 3 = 2020-12-31, rdq 2021-08-01 is too late to apply.
    assert_eq!(
        dates,
        vec![Some("2020-10-15".to_string()), Some("2020-12-31".to_string())]
    );

    let roaq = floats(&panel, "roaq");
    assert_eq!(roaq[0], None);
    assert_relative_eq!(roaq[1].unwrap(), 0.2, epsilon = 1e-12);
}

#[test]
fn test_crsp_returns_and_weights() {
    let options = DatasetOptions::Crsp(CrspOptions {
        momentum: Some(2),
        ..CrspOptions::default()
    });
    let mut session = QuerySession::build(mirror(), &options).unwrap();
    let panel = sorted(session.read_frame().unwrap(), "date");
    assert_eq!(panel.height(), 3);

    let me = floats(&panel, "me");
    assert_relative_eq!(me[0].unwrap(), 1000.0);

    let ret_adj = floats(&panel, "ret_adj");
    assert_relative_eq!(ret_adj[0].unwrap(), 0.0);
    assert_relative_eq!(ret_adj[1].unwrap(), 0.1, epsilon = 1e-12);
    assert_relative_eq!(ret_adj[2].unwrap(), 1.05 * 0.5 - 1.0, epsilon = 1e-12);

    let vweight = floats(&panel, "vweight");
    assert_eq!(vweight[0], None);
    assert_relative_eq!(vweight[1].unwrap(), 1000.0 * 1.1, epsilon = 1e-9);
    assert_relative_eq!(vweight[2].unwrap(), 1000.0 * 1.1 * 1.05, epsilon = 1e-9);

    let mom = floats(&panel, "mom_3");
    assert_eq!(mom[0], None);
    assert_relative_eq!(mom[2].unwrap(), 1.1 * 1.05 - 1.0, epsilon = 1e-12);

    assert_eq!(strings(&panel, "ticker")[0].as_deref(), Some("ABC"));
}

const VALUE_WEIGHT_MIRROR: &str = "
CREATE TABLE msf (
    permno INTEGER, permco INTEGER, date DATE, prc REAL, shrout REAL, ret REAL, retx REAL
);
INSERT INTO msf VALUES
    (1, 11, '2000-06-30', 10.0, 100.0, 0.0, 0.0),
    (1, 11, '2000-07-31', 11.0, 100.0, 0.1, 0.1),
    (1, 11, '2000-08-31', 11.55, 100.0, 0.05, 0.05),
    (1, 11, '2000-09-29', 11.55, 100.0, 0.0, 0.0),
    (1, 11, '2000-10-31', 12.0, 100.0, 0.2, 0.2),
    (2, 22, '2000-05-31', 5.0, 100.0, 0.0, 0.0),
    (2, 22, '2000-07-31', 5.5, 100.0, 0.1, 0.1),
    (2, 22, '2000-08-31', 6.0, 100.0, 0.1, 0.1);

CREATE TABLE senames (
    permno INTEGER, namedt DATE, nameendt DATE, ticker TEXT, ncusip TEXT,
    shrcd INTEGER, exchcd INTEGER
);
INSERT INTO senames VALUES
    (1, '1990-01-01', '2010-12-31', 'AAA', '00000001', 10, 1),
    (2, '1990-01-01', '2010-12-31', 'BBB', '00000002', 10, 1);

CREATE TABLE sedelist (permno INTEGER, dlstdt DATE, dlret REAL);
";

fn value_weights(permno: i64) -> Vec<Option<f64>> {
    let backend = SqliteBackend::in_memory().unwrap();
    backend
        .connection()
        .execute_batch(VALUE_WEIGHT_MIRROR)
        .unwrap();
    let options = DatasetOptions::Crsp(CrspOptions::default());
    let panel = sorted(
        QuerySession::build(backend, &options)
            .unwrap()
            .read_frame()
            .unwrap(),
        "date",
    );
    let mask = panel.column("permno").unwrap().i64().unwrap().equal(permno);
    floats(&panel.filter(&mask).unwrap(), "vweight")
}

#[test]
fn test_value_weights_compound_month_by_month() {
    let vweight = value_weights(1);
    assert_eq!(vweight.len(), 5);
    assert_eq!(vweight[0], None);

    let expected = [
        1000.0 * 1.1,
        1000.0 * 1.1 * 1.05,
        1000.0 * 1.1 * 1.05,
        1000.0 * 1.1 * 1.05 * 1.2,
    ];
    for (weight, expected) in vweight[1..].iter().zip(expected) {
        assert_relative_eq!(weight.unwrap(), expected, epsilon = 1e-9);
    }

    // Non-negative returns never shrink the weight below the anchor.
    let weights: Vec<f64> = vweight.iter().flatten().copied().collect();
    assert!(weights.iter().all(|w| *w >= 1000.0));
    assert!(weights.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[test]
fn test_value_weights_need_an_anchor_month() {
    let vweight = value_weights(2);
    assert_eq!(vweight, vec![None, None, None]);
}

#[test]
fn test_crsp_batches() {
    let options = DatasetOptions::Crsp(CrspOptions {
        vwm: None,
        ..CrspOptions::default()
    });
    let mut session = QuerySession::build(mirror(), &options).unwrap();
    let Fetch::Batches(batches) = session.execute(FetchOptions::chunked(2)).unwrap() else {
        panic!("expected batches");
    };
    let heights: Vec<usize> = batches.map(|batch| batch.unwrap().height()).collect();
    assert_eq!(heights, vec![2, 1]);
}

#[test]
fn test_names() {
    let options = DatasetOptions::Names(NamesOptions::default());
    let mut session = QuerySession::build(mirror(), &options).unwrap();
    let panel = session.read_frame().unwrap();

    assert_eq!(panel.height(), 1);
    assert_eq!(strings(&panel, "gvkey"), vec![Some("001004".to_string())]);
    let sdate = panel.column("sdate").unwrap().cast(&DataType::String).unwrap();
    assert_eq!(sdate.str().unwrap().get(0), Some("1991-01-01"));
}

#[test]
fn test_guidance_start_date() {
    let options = DatasetOptions::Guidance(GuidanceOptions::default());
    let mut session = QuerySession::build(mirror(), &options).unwrap();
    let panel = session.read_frame().unwrap();
    assert_eq!(panel.height(), 1);
    assert_eq!(strings(&panel, "ibesticker"), vec![Some("ABC".to_string())]);
    assert!(matches!(
        panel.column("announcedatetime").unwrap().dtype(),
        DataType::Datetime(TimeUnit::Microseconds, None)
    ));
}

#[test]
fn test_materialize() {
    let options = DatasetOptions::Funda(FundaOptions::default());
    let mut session = QuerySession::build(mirror(), &options).unwrap();

    session.materialize("funda_linked", false).unwrap();
    assert!(session.executor().has_table("funda_linked").unwrap());
    let count: i64 = session
        .executor()
        .connection()
        .query_row("SELECT COUNT(*) FROM funda_linked", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 2);

    let err = session.materialize("funda_linked", false).unwrap_err();
    assert!(matches!(err, QueryError::TableExists(_)));

    session.materialize("funda_linked", true).unwrap();
}

#[test]
fn test_missing_table_fails_at_build() {
    let backend = SqliteBackend::in_memory().unwrap();
    let err = QuerySession::build(backend, &DatasetOptions::Funda(FundaOptions::default()))
        .unwrap_err();
    assert!(matches!(err, QueryError::MissingTable(name) if name == "funda"));
}
