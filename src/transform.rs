//! # Transformações do Modelo Estrela
//!
//! Cada tabela é uma transformação declarativa sobre `LazyFrame`: projeção,
//! renomeação, filtro e deduplicação. Nada é materializado aqui; quem chama
//! decide quando coletar.
//!
//! A chave de junção da tabela fato compara `length == duration` com igualdade
//! exata de ponto flutuante. Durações com representações diferentes do mesmo
//! valor não casam e o evento é descartado silenciosamente.

use polars::prelude::*;

/// Valor de `page` que identifica uma reprodução de música.
pub const NEXT_SONG: &str = "NextSong";

/// Colunas de partição das tabelas particionadas por data.
pub const YEAR_MONTH: [&str; 2] = ["year", "month"];

/// Colunas de partição da tabela `songs`.
pub const YEAR_ARTIST: [&str; 2] = ["year", "artist_id"];

/// `songs`: song_id, title, artist_id, year, duration (distintos).
pub fn songs_table(songs: LazyFrame) -> LazyFrame {
    songs
        .select([
            col("song_id"),
            col("title"),
            col("artist_id"),
            col("year"),
            col("duration"),
        ])
        .unique_stable(None, UniqueKeepStrategy::First)
}

/// `artists`: artist_id, name, location, latitude, longitude (distintos).
pub fn artists_table(songs: LazyFrame) -> LazyFrame {
    songs
        .select([
            col("artist_id"),
            col("artist_name").alias("name"),
            col("artist_location").alias("location"),
            col("artist_latitude").alias("latitude"),
            col("artist_longitude").alias("longitude"),
        ])
        .unique_stable(None, UniqueKeepStrategy::First)
}

/// Mantém apenas os eventos de reprodução (`page == "NextSong"`).
pub fn play_events(logs: LazyFrame) -> LazyFrame {
    logs.filter(col("page").eq(lit(NEXT_SONG)))
}

/// `users`: user_id, first_name, last_name, gender, level (distintos).
pub fn users_table(plays: LazyFrame) -> LazyFrame {
    plays
        .select([
            col("userId").alias("user_id"),
            col("firstName").alias("first_name"),
            col("lastName").alias("last_name"),
            col("gender"),
            col("level"),
        ])
        .unique_stable(None, UniqueKeepStrategy::First)
}

/// Deriva `start_time` de `ts` (epoch em milissegundos), truncado para segundos.
pub fn with_start_time(plays: LazyFrame) -> LazyFrame {
    plays.with_column(
        (col("ts").floor_div(lit(1000i64)) * lit(1000i64))
            .cast(DataType::Datetime(TimeUnit::Milliseconds, None))
            .alias("start_time"),
    )
}

/// Dia da semana com domingo = 1 e sábado = 7.
fn weekday(start_time: Expr) -> Expr {
    // weekday() do Polars é ISO (segunda = 1, domingo = 7)
    ((start_time.dt().weekday() % lit(7)) + lit(1)).cast(DataType::Int8)
}

/// `time`: start_time e campos de calendário derivados. Espera `start_time` presente.
pub fn time_table(plays: LazyFrame) -> LazyFrame {
    plays
        .select([col("start_time")])
        .unique_stable(None, UniqueKeepStrategy::First)
        .with_columns([
            col("start_time").dt().hour().alias("hour"),
            col("start_time").dt().day().alias("day"),
            col("start_time").dt().week().alias("week"),
            col("start_time").dt().month().alias("month"),
            col("start_time").dt().year().alias("year"),
            weekday(col("start_time")).alias("weekday"),
        ])
}

/// `songplays` sem o id sintético, ordenada por `start_time` (ordem de geração dos ids).
///
/// Junção interna dos eventos de reprodução com os registros de músicas pela
/// chave tripla (título, artista, duração), seguida de deduplicação do resultado completo.
pub fn songplays_table(plays: LazyFrame, songs: LazyFrame) -> LazyFrame {
    plays
        .join(
            songs,
            [col("song"), col("artist"), col("length")],
            [col("title"), col("artist_name"), col("duration")],
            JoinArgs::new(JoinType::Inner),
        )
        .unique_stable(None, UniqueKeepStrategy::First)
        .select([
            col("start_time"),
            col("userId").alias("user_id"),
            col("level"),
            col("song_id"),
            col("artist_id"),
            col("sessionId").alias("session_id"),
            col("location"),
            col("userAgent").alias("user_agent"),
        ])
        .with_columns([
            col("start_time").dt().year().alias("year"),
            col("start_time").dt().month().alias("month"),
        ])
        .sort(
            ["start_time"],
            SortMultipleOptions::default().with_maintain_order(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn songs() -> DataFrame {
        df!(
            "song_id" => ["SOA", "SOA", "SOB"],
            "title" => ["Setanta matins", "Setanta matins", "Der Kleine Dompfaff"],
            "artist_id" => ["ARA", "ARA", "ARB"],
            "year" => [0i64, 0, 2008],
            "duration" => [269.58322, 269.58322, 152.92036],
            "artist_name" => ["Elena", "Elena", "Jim Dooley"],
            "artist_location" => [Some("Dubai UAE"), Some("Dubai UAE"), None],
            "artist_latitude" => [None, None, Some(34.05349f64)],
            "artist_longitude" => [None, None, Some(-118.24532f64)]
        )
        .unwrap()
    }

    fn logs() -> DataFrame {
        df!(
            "userId" => ["15", "15", "26", "8"],
            "firstName" => ["Lily", "Lily", "Ryan", "Kaylee"],
            "lastName" => ["Koch", "Koch", "Smith", "Summers"],
            "gender" => ["F", "F", "M", "F"],
            "level" => ["paid", "paid", "free", "free"],
            "page" => ["NextSong", "Home", "NextSong", "NextSong"],
            "ts" => [1541121934796i64, 1541121940000, 1541139353796, 1541106106796],
            "song" => [Some("Setanta matins"), None, Some("Unknown Song"), Some("Der Kleine Dompfaff")],
            "artist" => [Some("Elena"), None, Some("Nobody"), Some("Jim Dooley")],
            "length" => [Some(269.58322), None, Some(200.0), Some(152.92037)],
            "sessionId" => [818i64, 818, 169, 139],
            "location" => ["Chicago-Naperville-Elgin, IL-IN-WI", "Chicago-Naperville-Elgin, IL-IN-WI", "San Jose-Sunnyvale-Santa Clara, CA", "Phoenix-Mesa-Scottsdale, AZ"],
            "userAgent" => ["Mozilla/5.0", "Mozilla/5.0", "Mozilla/5.0", "Mozilla/5.0"]
        )
        .unwrap()
    }

    #[test]
    fn songs_and_artists_are_distinct() {
        let songs_out = songs_table(songs().lazy()).collect().unwrap();
        assert_eq!(songs_out.height(), 2);
        assert_eq!(
            songs_out.get_column_names_str(),
            vec!["song_id", "title", "artist_id", "year", "duration"]
        );

        let artists_out = artists_table(songs().lazy()).collect().unwrap();
        assert_eq!(artists_out.height(), 2);
        assert_eq!(
            artists_out.get_column_names_str(),
            vec!["artist_id", "name", "location", "latitude", "longitude"]
        );
    }

    #[test]
    fn users_only_come_from_next_song_events() {
        let logs = df!(
            "userId" => ["1", "2"],
            "firstName" => ["A", "B"],
            "lastName" => ["X", "Y"],
            "gender" => ["F", "M"],
            "level" => ["free", "paid"],
            "page" => ["NextSong", "Logout"]
        )
        .unwrap();

        let users = users_table(play_events(logs.lazy())).collect().unwrap();

        let ids: Vec<Option<&str>> = users.column("user_id").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(ids, vec![Some("1")]);
    }

    #[test]
    fn users_are_deduplicated() {
        let users = users_table(play_events(logs().lazy())).collect().unwrap();
        // Lily aparece duas vezes, mas só uma como NextSong; Ryan e Kaylee uma vez cada
        assert_eq!(users.height(), 3);
    }

    #[test]
    fn start_time_truncates_to_seconds() {
        let df = df!("ts" => [1541121934796i64, 1541121934000, 1541121934999]).unwrap();
        let out = with_start_time(df.lazy()).collect().unwrap();

        let millis: Vec<Option<i64>> = out
            .column("start_time")
            .unwrap()
            .cast(&DataType::Int64)
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect();

        assert_eq!(
            millis,
            vec![Some(1541121934000), Some(1541121934000), Some(1541121934000)]
        );
    }

    #[test]
    fn time_table_derives_calendar_fields() {
        // 2018-11-02 01:25:34 UTC, sexta-feira; 2018-11-04 23:00:00 UTC, domingo
        let df = df!("ts" => [1541121934796i64, 1541121934100, 1541372400000]).unwrap();
        let time = time_table(with_start_time(df.lazy())).collect().unwrap();

        assert_eq!(time.height(), 2);
        assert_eq!(
            time.get_column_names_str(),
            vec!["start_time", "hour", "day", "week", "month", "year", "weekday"]
        );

        let field = |name: &str| -> Vec<i64> {
            time.column(name)
                .unwrap()
                .cast(&DataType::Int64)
                .unwrap()
                .i64()
                .unwrap()
                .into_no_null_iter()
                .collect()
        };

        assert_eq!(field("hour"), vec![1, 23]);
        assert_eq!(field("day"), vec![2, 4]);
        assert_eq!(field("week"), vec![44, 44]);
        assert_eq!(field("month"), vec![11, 11]);
        assert_eq!(field("year"), vec![2018, 2018]);
        assert_eq!(field("weekday"), vec![6, 1]);
    }

    #[test]
    fn songplays_require_exact_triple_match() {
        let plays = with_start_time(play_events(logs().lazy()));
        let songplays = songplays_table(plays, songs().lazy()).collect().unwrap();

        // Só o evento de "Setanta matins" casa; Jim Dooley difere na duração
        assert_eq!(songplays.height(), 1);
        assert_eq!(
            songplays.get_column_names_str(),
            vec![
                "start_time",
                "user_id",
                "level",
                "song_id",
                "artist_id",
                "session_id",
                "location",
                "user_agent",
                "year",
                "month"
            ]
        );

        let song_id = songplays.column("song_id").unwrap().str().unwrap().get(0);
        let user_id = songplays.column("user_id").unwrap().str().unwrap().get(0);
        assert_eq!(song_id, Some("SOA"));
        assert_eq!(user_id, Some("15"));
    }

    #[test]
    fn songplays_are_sorted_by_start_time() {
        let songs = df!(
            "song_id" => ["S1", "S2"],
            "title" => ["a", "b"],
            "artist_id" => ["A1", "A2"],
            "year" => [2000i64, 2001],
            "duration" => [1.5, 2.5],
            "artist_name" => ["x", "y"],
            "artist_location" => ["", ""],
            "artist_latitude" => [0.0, 0.0],
            "artist_longitude" => [0.0, 0.0]
        )
        .unwrap();
        let logs = df!(
            "userId" => ["1", "2", "3"],
            "level" => ["free", "free", "paid"],
            "page" => ["NextSong", "NextSong", "NextSong"],
            "ts" => [3000i64, 1000, 2000],
            "song" => ["a", "b", "a"],
            "artist" => ["x", "y", "x"],
            "length" => [1.5, 2.5, 1.5],
            "sessionId" => [1i64, 2, 3],
            "location" => ["l", "l", "l"],
            "userAgent" => ["u", "u", "u"]
        )
        .unwrap();

        let songplays = songplays_table(with_start_time(logs.lazy()), songs.lazy())
            .collect()
            .unwrap();

        let users: Vec<Option<&str>> = songplays.column("user_id").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(users, vec![Some("2"), Some("3"), Some("1")]);
    }
}
